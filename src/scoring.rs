//! Point values, combos, and the per-session score accumulator.

use crate::srs::MAX_LEVEL;
use serde::{Deserialize, Serialize};

const BASE_POINTS: f64 = 100.0;
const MAX_TIME_BONUS: f64 = 50.0;
const COMBO_STEP: i64 = 5;

/// Points for one correct answer.
///
/// Out-of-range inputs are clamped rather than rejected: a command at level 0
/// or a timer reading exactly zero are normal boundary cases.
pub fn calculate_score(time_remaining: f64, max_time: f64, level: i64, combo: i64) -> u64 {
    let time_remaining = time_remaining.max(0.0);
    let max_time = if max_time > 0.0 { max_time } else { 1.0 };
    let level = level.clamp(0, i64::from(MAX_LEVEL));

    let time_bonus = (time_remaining / max_time) * MAX_TIME_BONUS;
    let level_multiplier = (level + 1) as f64;
    let combo_multiplier = combo_multiplier(combo) as f64;

    ((BASE_POINTS + time_bonus) * level_multiplier * combo_multiplier).floor() as u64
}

pub fn combo_multiplier(combo: i64) -> u64 {
    (combo.max(0) / COMBO_STEP) as u64 + 1
}

pub fn update_combo(is_correct: bool, current_combo: i64) -> u64 {
    if is_correct {
        current_combo.max(0) as u64 + 1
    } else {
        0
    }
}

/// Result of recording one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub score: u64,
    pub combo: u64,
    pub total_score: u64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_score: u64,
    pub current_combo: u64,
    pub best_combo: u64,
    pub correct_count: u64,
    pub incorrect_count: u64,
    pub total_attempts: u64,
    /// Percent correct, one decimal place
    pub accuracy: f64,
}

/// Running totals for one play session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreSession {
    total_score: u64,
    current_combo: u64,
    best_combo: u64,
    correct_count: u64,
    incorrect_count: u64,
}

impl ScoreSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(
        &mut self,
        is_correct: bool,
        time_remaining: f64,
        max_time: f64,
        level: i64,
    ) -> AttemptOutcome {
        self.current_combo = update_combo(is_correct, self.current_combo as i64);
        self.best_combo = self.best_combo.max(self.current_combo);

        let score = if is_correct {
            self.correct_count += 1;
            let points = calculate_score(time_remaining, max_time, level, self.current_combo as i64);
            self.total_score += points;
            points
        } else {
            self.incorrect_count += 1;
            0
        };

        AttemptOutcome {
            score,
            combo: self.current_combo,
            total_score: self.total_score,
            is_correct,
        }
    }

    pub fn stats(&self) -> SessionStats {
        let total_attempts = self.correct_count + self.incorrect_count;
        let accuracy = if total_attempts == 0 {
            0.0
        } else {
            (1000.0 * self.correct_count as f64 / total_attempts as f64).round() / 10.0
        };

        SessionStats {
            total_score: self.total_score,
            current_combo: self.current_combo,
            best_combo: self.best_combo,
            correct_count: self.correct_count,
            incorrect_count: self.incorrect_count,
            total_attempts,
            accuracy,
        }
    }

    pub fn total_score(&self) -> u64 {
        self.total_score
    }

    pub fn current_combo(&self) -> u64 {
        self.current_combo
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
