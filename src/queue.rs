//! Picks the next command to present.
//!
//! Only due commands are considered. Level-0 commands (new or just failed)
//! always win; otherwise lower levels are favoured with weight `1/(level+1)`.

use crate::srs::{CommandState, MAX_LEVEL};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("command '{key}' has level {level}, expected 0..={max}", max = MAX_LEVEL)]
    InvalidLevel { key: String, level: u8 },
}

/// Anything the selector can rank: a key plus its review state
pub trait QueueItem {
    fn key(&self) -> &str;
    fn state(&self) -> &CommandState;
}

impl QueueItem for (String, CommandState) {
    fn key(&self) -> &str {
        &self.0
    }

    fn state(&self) -> &CommandState {
        &self.1
    }
}

fn checked_level<T: QueueItem>(item: &T) -> Result<u8, QueueError> {
    let level = item.state().level;
    if level > MAX_LEVEL {
        return Err(QueueError::InvalidLevel {
            key: item.key().to_string(),
            level,
        });
    }
    Ok(level)
}

fn weight_for(level: u8) -> f64 {
    1.0 / (f64::from(level) + 1.0)
}

/// One weight per command, in input order.
pub fn compute_weights<T: QueueItem>(commands: &[T]) -> Result<Vec<f64>, QueueError> {
    commands
        .iter()
        .map(|c| checked_level(c).map(weight_for))
        .collect()
}

/// Choose the next command, or `None` when nothing is due.
///
/// `current` is skipped unless it is the only due command.
pub fn select_next<'a, T, R>(
    commands: &'a [T],
    current: Option<&str>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Option<&'a T>, QueueError>
where
    T: QueueItem,
    R: Rng + ?Sized,
{
    for command in commands {
        checked_level(command)?;
    }

    let due: Vec<&T> = commands
        .iter()
        .filter(|c| c.state().is_review_open(now))
        .collect();
    if due.is_empty() {
        return Ok(None);
    }

    let pool: Vec<&T> = match current {
        Some(current_key) => {
            let others: Vec<&T> = due
                .iter()
                .copied()
                .filter(|c| c.key() != current_key)
                .collect();
            if others.is_empty() {
                due
            } else {
                others
            }
        }
        None => due,
    };

    let fresh: Vec<&T> = pool
        .iter()
        .copied()
        .filter(|c| c.state().level == 0)
        .collect();
    if let Some(pick) = fresh.choose(&mut *rng) {
        return Ok(Some(*pick));
    }

    let weights: Vec<f64> = pool.iter().map(|c| weight_for(c.state().level)).collect();
    let total: f64 = weights.iter().sum();
    let mut r = rng.gen::<f64>() * total;

    for (command, weight) in pool.iter().zip(&weights) {
        r -= weight;
        if r <= 0.0 {
            return Ok(Some(*command));
        }
    }

    // float drift can leave a sliver of r > 0 after the walk
    Ok(pool.last().copied())
}
