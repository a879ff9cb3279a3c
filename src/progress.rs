use crate::app_dirs::AppDirs;
use crate::scoring::SessionStats;
use crate::srs::CommandState;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode progress: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lifetime totals across sessions for one pack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub sessions_played: u64,
    pub total_correct: u64,
    pub total_incorrect: u64,
    pub best_score: u64,
    pub best_combo: u64,
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
}

impl AggregateStats {
    pub fn absorb(&mut self, session: &SessionStats, at: DateTime<Utc>) {
        self.sessions_played += 1;
        self.total_correct += session.correct_count;
        self.total_incorrect += session.incorrect_count;
        self.best_score = self.best_score.max(session.total_score);
        self.best_combo = self.best_combo.max(session.best_combo);
        self.last_played = Some(at);
    }

    pub fn lifetime_accuracy(&self) -> f64 {
        let total = self.total_correct + self.total_incorrect;
        if total == 0 {
            0.0
        } else {
            (1000.0 * self.total_correct as f64 / total as f64).round() / 10.0
        }
    }
}

/// Everything persisted for one pack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub pack_id: String,
    #[serde(default)]
    pub commands: HashMap<String, CommandState>,
    #[serde(default)]
    pub stats: AggregateStats,
}

impl ProgressRecord {
    pub fn new(pack_id: &str) -> Self {
        Self {
            pack_id: pack_id.to_string(),
            ..Default::default()
        }
    }
}

/// Key-value progress storage keyed by pack id
pub trait ProgressStore {
    /// Saved record, or a fresh one when the pack has never been played
    fn load(&self, pack_id: &str) -> Result<ProgressRecord, StoreError>;
    fn save(&self, pack_id: &str, record: &ProgressRecord) -> Result<(), StoreError>;
    /// Returns whether anything was removed
    fn delete(&self, pack_id: &str) -> Result<bool, StoreError>;
}

impl<S: ProgressStore + ?Sized> ProgressStore for Box<S> {
    fn load(&self, pack_id: &str) -> Result<ProgressRecord, StoreError> {
        (**self).load(pack_id)
    }

    fn save(&self, pack_id: &str, record: &ProgressRecord) -> Result<(), StoreError> {
        (**self).save(pack_id, record)
    }

    fn delete(&self, pack_id: &str) -> Result<bool, StoreError> {
        (**self).delete(pack_id)
    }
}

/// SQLite-backed store; one JSON record per pack
#[derive(Debug)]
pub struct SqliteProgressStore {
    conn: Connection,
}

impl SqliteProgressStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open the database under the user's state directory
    pub fn open_default() -> Result<Self, StoreError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("keydrill_progress.db"));
        tracing::debug!(path = %path.display(), "opening progress database");
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                pack_id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl ProgressStore for SqliteProgressStore {
    fn load(&self, pack_id: &str) -> Result<ProgressRecord, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM progress WHERE pack_id = ?1",
                [pack_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => {
                let mut record: ProgressRecord = serde_json::from_str(&json)?;
                record.pack_id = pack_id.to_string();
                tracing::debug!(pack = pack_id, commands = record.commands.len(), "loaded progress");
                Ok(record)
            }
            None => Ok(ProgressRecord::new(pack_id)),
        }
    }

    fn save(&self, pack_id: &str, record: &ProgressRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.conn.execute(
            r#"
            INSERT INTO progress (pack_id, record, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(pack_id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at
            "#,
            params![pack_id, json, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(pack = pack_id, "saved progress");
        Ok(())
    }

    fn delete(&self, pack_id: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM progress WHERE pack_id = ?1", [pack_id])?;
        tracing::info!(pack = pack_id, removed, "deleted progress");
        Ok(removed > 0)
    }
}

/// In-process store for tests and runs that should leave no trace
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: RefCell<HashMap<String, ProgressRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self, pack_id: &str) -> Result<ProgressRecord, StoreError> {
        Ok(self
            .records
            .borrow()
            .get(pack_id)
            .cloned()
            .unwrap_or_else(|| ProgressRecord::new(pack_id)))
    }

    fn save(&self, pack_id: &str, record: &ProgressRecord) -> Result<(), StoreError> {
        self.records
            .borrow_mut()
            .insert(pack_id.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, pack_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.borrow_mut().remove(pack_id).is_some())
    }
}
