//! A pack's commands paired with their review state for one training run.

use crate::pack::{CommandDef, Pack};
use crate::queue::{self, QueueError, QueueItem};
use crate::srs::{level_name, CommandState, SrsConfig, MAX_LEVEL};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeckError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Seconds allowed to answer, by level, before the complexity multiplier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeLimits {
    pub base_secs: [f64; 6],
    pub scale: f64,
}

impl TimeLimits {
    pub fn limit(&self, level: u8, complexity: f64) -> f64 {
        let base = self.base_secs[usize::from(level.min(MAX_LEVEL))];
        base * complexity.max(0.0) * self.scale.max(0.0)
    }
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            base_secs: [8.0, 7.0, 6.0, 5.0, 4.0, 3.0],
            scale: 1.0,
        }
    }
}

/// An authored command together with its current review state
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingCommand {
    pub def: Arc<CommandDef>,
    pub group: String,
    pub state: CommandState,
}

impl TrainingCommand {
    pub fn keys(&self) -> &str {
        &self.def.keys
    }
}

impl QueueItem for TrainingCommand {
    fn key(&self) -> &str {
        &self.def.keys
    }

    fn state(&self) -> &CommandState {
        &self.state
    }
}

#[derive(Debug, Clone)]
pub struct Deck {
    pack_id: String,
    commands: Vec<TrainingCommand>,
    /// Saved states for keys the current pack no longer has
    orphans: HashMap<String, CommandState>,
    since_seen: HashMap<String, u32>,
    srs: SrsConfig,
    limits: TimeLimits,
}

impl Deck {
    pub fn new(pack: &Pack, saved: &HashMap<String, CommandState>) -> Self {
        Self::with_config(pack, saved, SrsConfig::default(), TimeLimits::default())
    }

    pub fn with_config(
        pack: &Pack,
        saved: &HashMap<String, CommandState>,
        srs: SrsConfig,
        limits: TimeLimits,
    ) -> Self {
        let commands: Vec<TrainingCommand> = pack
            .commands()
            .map(|(group, def)| TrainingCommand {
                state: saved.get(&def.keys).cloned().unwrap_or_default(),
                def: Arc::new(def.clone()),
                group: group.name.clone(),
            })
            .collect();

        let orphans: HashMap<String, CommandState> = saved
            .iter()
            .filter(|(key, _)| !commands.iter().any(|c| c.keys() == key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !orphans.is_empty() {
            tracing::warn!(pack = %pack.id, count = orphans.len(), "saved progress for commands not in pack");
        }

        let since_seen = commands.iter().map(|c| (c.keys().to_string(), 0)).collect();

        Self {
            pack_id: pack.id.clone(),
            commands,
            orphans,
            since_seen,
            srs,
            limits,
        }
    }

    pub fn pack_id(&self) -> &str {
        &self.pack_id
    }

    pub fn commands(&self) -> &[TrainingCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&TrainingCommand> {
        self.commands.iter().find(|c| c.keys() == key)
    }

    pub fn groups(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.group.as_str()).unique().collect()
    }

    /// Snapshot of every known state, ready to persist
    pub fn states(&self) -> HashMap<String, CommandState> {
        let mut states = self.orphans.clone();
        states.extend(
            self.commands
                .iter()
                .map(|c| (c.keys().to_string(), c.state.clone())),
        );
        states
    }

    pub fn commands_since_seen(&self, key: &str) -> u32 {
        self.since_seen.get(key).copied().unwrap_or(0)
    }

    pub fn is_due(&self, key: &str, now: DateTime<Utc>) -> Result<bool, DeckError> {
        let cmd = self
            .get(key)
            .ok_or_else(|| DeckError::UnknownCommand(key.to_string()))?;
        Ok(self.srs.is_due(&cmd.state, self.commands_since_seen(key), now))
    }

    pub fn due_count(&self, now: DateTime<Utc>) -> usize {
        self.commands
            .iter()
            .filter(|c| self.srs.is_due(&c.state, self.commands_since_seen(c.keys()), now))
            .count()
    }

    pub fn time_limit(&self, key: &str) -> Result<f64, DeckError> {
        let cmd = self
            .get(key)
            .ok_or_else(|| DeckError::UnknownCommand(key.to_string()))?;
        Ok(self.limits.limit(cmd.state.level, cmd.def.complexity))
    }

    /// Count of commands at each level
    pub fn level_summary(&self) -> [usize; 6] {
        let mut counts = [0; 6];
        for c in &self.commands {
            counts[usize::from(c.state.level.min(MAX_LEVEL))] += 1;
        }
        counts
    }

    /// Apply one answer. Every other command gets one step further from last seen.
    pub fn record(
        &mut self,
        key: &str,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<CommandState, DeckError> {
        let srs = self.srs;
        let cmd = self
            .commands
            .iter_mut()
            .find(|c| c.def.keys == key)
            .ok_or_else(|| DeckError::UnknownCommand(key.to_string()))?;

        let before = cmd.state.level;
        cmd.state = srs.transition(&cmd.state, is_correct, now);
        let after = cmd.state.clone();

        if before != after.level {
            tracing::info!(
                command = key,
                from = level_name(before.into()),
                to = level_name(after.level.into()),
                "level changed"
            );
        }

        for (k, count) in self.since_seen.iter_mut() {
            if k == key {
                *count = 0;
            } else {
                *count = count.saturating_add(1);
            }
        }

        Ok(after)
    }

    /// Pick the next command to present.
    ///
    /// Review time decides first. When nothing is open by time, commands whose
    /// count-based interval has elapsed are offered instead.
    pub fn select_next<R: Rng + ?Sized>(
        &self,
        current: Option<&str>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Option<&TrainingCommand>, DeckError> {
        if let Some(pick) = queue::select_next(&self.commands, current, now, rng)? {
            return Ok(Some(pick));
        }

        let paced: Vec<(String, CommandState)> = self
            .commands
            .iter()
            .filter(|c| self.srs.is_due(&c.state, self.commands_since_seen(c.keys()), now))
            .map(|c| {
                let mut state = c.state.clone();
                state.next_review = None;
                (c.keys().to_string(), state)
            })
            .collect();

        let pick = queue::select_next(&paced, current, now, rng)?;
        Ok(pick.and_then(|(key, _)| self.get(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn pack() -> Pack {
        Pack::from_json(
            r#"{
                "id": "t", "name": "T", "version": "1",
                "groups": [
                    { "name": "a", "commands": [
                        { "keys": "dd", "concept": "delete line", "color": "red", "complexity": 1.0, "target_type": "line" },
                        { "keys": "yy", "concept": "yank line", "color": "green", "complexity": 2.0, "target_type": "line" }
                    ] },
                    { "name": "b", "commands": [
                        { "keys": "u", "concept": "undo", "color": "yellow", "complexity": 1.0, "target_type": "none" }
                    ] }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_states_default_lazily() {
        let mut saved = HashMap::new();
        saved.insert(
            "yy".to_string(),
            CommandState {
                level: 3,
                ..Default::default()
            },
        );
        let deck = Deck::new(&pack(), &saved);
        assert_eq!(deck.len(), 3);
        assert_eq!(deck.get("dd").unwrap().state, CommandState::default());
        assert_eq!(deck.get("yy").unwrap().state.level, 3);
        assert_eq!(deck.groups(), vec!["a", "b"]);
    }

    #[test]
    fn test_orphan_states_survive_snapshot() {
        let mut saved = HashMap::new();
        saved.insert("gone".to_string(), CommandState::default());
        let deck = Deck::new(&pack(), &saved);
        let states = deck.states();
        assert!(states.contains_key("gone"));
        assert_eq!(states.len(), 4);
    }

    #[test]
    fn test_record_updates_state_and_counters() {
        let mut deck = Deck::new(&pack(), &HashMap::new());
        for _ in 0..3 {
            deck.record("dd", true, now()).unwrap();
        }
        assert_eq!(deck.get("dd").unwrap().state.level, 1);
        assert_eq!(deck.commands_since_seen("dd"), 0);
        assert_eq!(deck.commands_since_seen("yy"), 3);

        deck.record("yy", false, now()).unwrap();
        assert_eq!(deck.commands_since_seen("dd"), 1);
        assert_eq!(deck.get("yy").unwrap().state.failures, 1);
    }

    #[test]
    fn test_record_unknown_key() {
        let mut deck = Deck::new(&pack(), &HashMap::new());
        assert_matches!(
            deck.record("zz", true, now()),
            Err(DeckError::UnknownCommand(ref k)) if k == "zz"
        );
    }

    #[test]
    fn test_count_based_due() {
        let mut deck = Deck::new(&pack(), &HashMap::new());
        for _ in 0..3 {
            deck.record("dd", true, now()).unwrap();
        }
        assert!(!deck.is_due("dd", now()).unwrap());
        for _ in 0..3 {
            deck.record("u", true, now()).unwrap();
        }
        // level 1 waits three other commands
        assert!(deck.is_due("dd", now()).unwrap());
    }

    #[test]
    fn test_time_limit_scales_with_complexity() {
        let deck = Deck::new(&pack(), &HashMap::new());
        assert_eq!(deck.time_limit("dd").unwrap(), 8.0);
        assert_eq!(deck.time_limit("yy").unwrap(), 16.0);

        let limits = TimeLimits {
            scale: 0.5,
            ..Default::default()
        };
        assert_eq!(limits.limit(5, 2.0), 3.0);
    }

    #[test]
    fn test_select_falls_back_to_count_pacing() {
        let mut deck = Deck::new(&pack(), &HashMap::new());
        let mut rng = StdRng::seed_from_u64(5);
        for key in ["dd", "yy", "u"] {
            for _ in 0..3 {
                deck.record(key, true, now()).unwrap();
            }
        }
        // all at level 1, reviews 7.5s out; dd has seen 6 others since
        assert!(deck
            .select_next(None, now() + Duration::seconds(1), &mut rng)
            .unwrap()
            .is_some_and(|c| c.keys() == "dd" || c.keys() == "yy"));
        let later = now() + Duration::seconds(8);
        assert!(deck.select_next(None, later, &mut rng).unwrap().is_some());
    }

    #[test]
    fn test_level_summary() {
        let mut deck = Deck::new(&pack(), &HashMap::new());
        for _ in 0..3 {
            deck.record("u", true, now()).unwrap();
        }
        assert_eq!(deck.level_summary(), [2, 1, 0, 0, 0, 0]);
    }
}
