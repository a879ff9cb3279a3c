use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

static PACK_DIR: Dir = include_dir!("src/packs");

pub const COLORS: [&str; 7] = ["red", "green", "blue", "yellow", "magenta", "cyan", "white"];

pub const TARGET_TYPES: [&str; 7] = ["char", "word", "line", "buffer", "selection", "window", "none"];

pub const MIN_COMPLEXITY: f64 = 1.0;
pub const MAX_COMPLEXITY: f64 = 5.0;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("pack '{0}' not found")]
    NotFound(String),

    #[error("pack file is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("failed to parse pack: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid pack '{pack}': {message}")]
    Invalid { pack: String, message: String },
}

/// One trainable keybinding, as authored
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CommandDef {
    pub keys: String,
    pub concept: String,
    pub color: String,
    #[serde(default = "default_complexity")]
    pub complexity: f64,
    pub target_type: String,
}

fn default_complexity() -> f64 {
    MIN_COMPLEXITY
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CommandGroup {
    pub name: String,
    pub commands: Vec<CommandDef>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Pack {
    pub id: String,
    pub name: String,
    pub version: String,
    pub groups: Vec<CommandGroup>,
}

impl Pack {
    /// Load one of the packs compiled into the binary
    pub fn builtin(id: &str) -> Result<Self, PackError> {
        let file = PACK_DIR
            .get_file(format!("{id}.json"))
            .ok_or_else(|| PackError::NotFound(id.to_string()))?;
        let contents = file
            .contents_utf8()
            .ok_or_else(|| PackError::Encoding(id.to_string()))?;
        Self::from_json(contents)
    }

    pub fn from_json(json: &str) -> Result<Self, PackError> {
        let pack: Pack = serde_json::from_str(json)?;
        pack.validate()?;
        tracing::debug!(pack = %pack.id, commands = pack.command_count(), "loaded pack");
        Ok(pack)
    }

    pub fn command_count(&self) -> usize {
        self.groups.iter().map(|g| g.commands.len()).sum()
    }

    pub fn commands(&self) -> impl Iterator<Item = (&CommandGroup, &CommandDef)> {
        self.groups
            .iter()
            .flat_map(|g| g.commands.iter().map(move |c| (g, c)))
    }

    /// Schema check only; says nothing about whether the bindings are right.
    pub fn validate(&self) -> Result<(), PackError> {
        let invalid = |message: String| PackError::Invalid {
            pack: self.id.clone(),
            message,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".into()));
        }
        if self.groups.is_empty() {
            return Err(invalid("no command groups".into()));
        }

        let mut seen = HashSet::new();
        for (group, cmd) in self.commands() {
            if cmd.keys.trim().is_empty() {
                return Err(invalid(format!("empty keys in group '{}'", group.name)));
            }
            if !seen.insert(cmd.keys.as_str()) {
                return Err(invalid(format!("duplicate keys '{}'", cmd.keys)));
            }
            if !(MIN_COMPLEXITY..=MAX_COMPLEXITY).contains(&cmd.complexity) {
                return Err(invalid(format!(
                    "complexity {} for '{}' outside {MIN_COMPLEXITY}..={MAX_COMPLEXITY}",
                    cmd.complexity, cmd.keys
                )));
            }
            if !COLORS.contains(&cmd.color.as_str()) {
                return Err(invalid(format!("unknown color '{}' for '{}'", cmd.color, cmd.keys)));
            }
            if !TARGET_TYPES.contains(&cmd.target_type.as_str()) {
                return Err(invalid(format!(
                    "unknown target type '{}' for '{}'",
                    cmd.target_type, cmd.keys
                )));
            }
        }

        Ok(())
    }
}

/// Ids of every embedded pack, sorted
pub fn builtin_ids() -> Vec<String> {
    let mut ids: Vec<String> = PACK_DIR
        .files()
        .filter_map(|f| {
            let path = f.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
                _ => None,
            }
        })
        .collect();
    ids.sort();
    ids
}
