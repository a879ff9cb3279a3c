//! Spaced-repetition state machine for trained commands.
//!
//! Levels run from 0 (`NEW`) to 5 (`MASTERED`). Three consecutive correct
//! answers advance one level; any miss drops the command straight back to 0.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_LEVEL: u8 = 5;

const LEVEL_NAMES: [&str; 6] = [
    "NEW",
    "LEARNING",
    "FAMILIAR",
    "CONFIDENT",
    "PROFICIENT",
    "MASTERED",
];

/// Per-command review state, persisted between sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandState {
    pub level: u8,
    /// Consecutive correct answers at the current level
    pub successes: u32,
    /// Lifetime misses
    pub failures: u32,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_review: Option<DateTime<Utc>>,
}

impl CommandState {
    /// A command with no `next_review` or one at/before `now` is eligible for selection.
    pub fn is_review_open(&self, now: DateTime<Utc>) -> bool {
        self.next_review.map_or(true, |at| at <= now)
    }
}

/// Tunables for the scheduler. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrsConfig {
    /// Commands that must pass before a command at level `i` is due again
    pub interval_commands: [u32; 6],
    /// Wall-clock stand-in for one presented command
    pub ms_per_command: i64,
    pub successes_to_advance: u32,
}

impl SrsConfig {
    pub const DEFAULT: SrsConfig = SrsConfig {
        interval_commands: [0, 3, 10, 25, 50, 100],
        ms_per_command: 2500,
        successes_to_advance: 3,
    };

    pub fn interval_commands(&self, level: u8) -> u32 {
        let idx = usize::from(level.min(MAX_LEVEL));
        self.interval_commands[idx]
    }

    pub fn transition(&self, state: &CommandState, is_correct: bool, now: DateTime<Utc>) -> CommandState {
        let mut next = state.clone();

        if is_correct {
            next.successes = next.successes.saturating_add(1);
            if next.successes >= self.successes_to_advance && next.level < MAX_LEVEL {
                next.level += 1;
                next.successes = 0;
            }
        } else {
            next.level = 0;
            next.successes = 0;
            next.failures = next.failures.saturating_add(1);
        }

        next.last_seen = Some(now);
        next.next_review = Some(self.next_review_time(next.level, now));
        next
    }

    pub fn next_review_time(&self, level: u8, now: DateTime<Utc>) -> DateTime<Utc> {
        if level == 0 {
            return now;
        }
        let commands = i64::from(self.interval_commands(level));
        now + Duration::milliseconds(commands * self.ms_per_command)
    }

    /// Count-based pacing OR wall-clock expiry; level 0 is always due.
    pub fn is_due(&self, state: &CommandState, commands_since_last_seen: u32, now: DateTime<Utc>) -> bool {
        if state.level == 0 {
            return true;
        }
        if commands_since_last_seen >= self.interval_commands(state.level) {
            return true;
        }
        matches!(state.next_review, Some(at) if now >= at)
    }
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Apply one answer to a command state using the default scheduler.
pub fn transition(state: &CommandState, is_correct: bool, now: DateTime<Utc>) -> CommandState {
    SrsConfig::DEFAULT.transition(state, is_correct, now)
}

pub fn next_review_time(level: u8, now: DateTime<Utc>) -> DateTime<Utc> {
    SrsConfig::DEFAULT.next_review_time(level, now)
}

pub fn is_due(state: &CommandState, commands_since_last_seen: u32, now: DateTime<Utc>) -> bool {
    SrsConfig::DEFAULT.is_due(state, commands_since_last_seen, now)
}

/// Share of correct answers in the current streak vs lifetime misses, 0-100.
///
/// `successes` is the streak counter that resets on every level change, so a
/// command that just levelled up reads as 0 until it is answered again.
pub fn mastery_percent(state: &CommandState) -> u8 {
    let total = u64::from(state.successes) + u64::from(state.failures);
    if total == 0 {
        return 0;
    }
    ((100.0 * f64::from(state.successes)) / total as f64).round() as u8
}

pub fn level_name(level: i64) -> &'static str {
    usize::try_from(level)
        .ok()
        .and_then(|idx| LEVEL_NAMES.get(idx))
        .copied()
        .unwrap_or("UNKNOWN")
}
