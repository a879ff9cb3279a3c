//! Drives one training session: presents commands, times answers, and feeds
//! results through the scheduler, the scorer, and the progress store.

use crate::config::Config;
use crate::deck::{Deck, TimeLimits, TrainingCommand};
use crate::error::Result;
use crate::keys::{KeyBuffer, MatchProgress};
use crate::pack::Pack;
use crate::progress::{AggregateStats, ProgressRecord, ProgressStore};
use crate::scoring::{ScoreSession, SessionStats};
use crate::srs::SrsConfig;
use crate::timer::{Clock, Timer, TimerEvent};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Ready,
    Presenting,
    NothingDue,
    Finished,
}

/// What happened to the last presented command
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub keys: String,
    pub concept: String,
    pub correct: bool,
    pub timed_out: bool,
    pub score: u64,
    pub combo: u64,
    pub level: u8,
}

#[derive(Debug)]
struct Presentation {
    key: String,
    timer: Timer,
    buffer: KeyBuffer,
    max_time: f64,
}

pub struct Game<S: ProgressStore> {
    deck: Deck,
    session: ScoreSession,
    store: S,
    stats: AggregateStats,
    config: Config,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    origin: (Instant, DateTime<Utc>),
    current: Option<Presentation>,
    last_key: Option<String>,
    answered: usize,
    phase: Phase,
    history: Vec<Feedback>,
    saved: bool,
}

impl<S: ProgressStore> Game<S> {
    pub fn new(pack: &Pack, store: S, config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let record = store.load(&pack.id)?;
        let deck = Deck::with_config(
            pack,
            &record.commands,
            SrsConfig::default(),
            time_limits(config),
        );
        tracing::info!(pack = %pack.id, commands = deck.len(), "starting session");

        Ok(Self {
            deck,
            session: ScoreSession::new(),
            store,
            stats: record.stats,
            config: config.clone(),
            origin: (clock.now(), Utc::now()),
            clock,
            rng: StdRng::from_entropy(),
            current: None,
            last_key: None,
            answered: 0,
            phase: Phase::Ready,
            history: Vec::new(),
            saved: false,
        })
    }

    /// Fix the selection order, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Wall-clock time as seen through the injected clock
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = self.clock.now().saturating_duration_since(self.origin.0);
        self.origin.1 + ChronoDuration::from_std(elapsed).unwrap_or_else(|_| ChronoDuration::zero())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn lifetime(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn history(&self) -> &[Feedback] {
        &self.history
    }

    pub fn last_feedback(&self) -> Option<&Feedback> {
        self.history.last()
    }

    pub fn answered(&self) -> usize {
        self.answered
    }

    pub fn commands_per_session(&self) -> usize {
        self.config.commands_per_session
    }

    pub fn current_command(&self) -> Option<&TrainingCommand> {
        self.current.as_ref().and_then(|p| self.deck.get(&p.key))
    }

    pub fn typed(&self) -> &[String] {
        self.current.as_ref().map(|p| p.buffer.typed()).unwrap_or(&[])
    }

    pub fn remaining(&self) -> f64 {
        self.current.as_ref().map(|p| p.timer.remaining()).unwrap_or(0.0)
    }

    pub fn time_fraction(&self) -> f64 {
        self.current
            .as_ref()
            .map(|p| p.timer.fraction_remaining())
            .unwrap_or(0.0)
    }

    pub fn is_paused(&self) -> bool {
        self.current.as_ref().is_some_and(|p| p.timer.is_paused())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.phase == Phase::Ready {
            self.present_next()?;
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        if let Some(p) = self.current.as_mut() {
            p.timer.pause();
        }
    }

    pub fn resume(&mut self) {
        if let Some(p) = self.current.as_mut() {
            p.timer.start();
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Feed one decoded key press to the active command.
    /// A press that lands after the deadline is a timeout, not an answer.
    pub fn handle_key(&mut self, key: &str) -> Result<Option<Feedback>> {
        if self.phase != Phase::Presenting || self.is_paused() {
            return Ok(None);
        }
        let expired = match self.current.as_mut() {
            Some(p) => p.timer.poll() == Some(TimerEvent::Completed) || !p.timer.is_active(),
            None => return Ok(None),
        };
        if expired {
            return match self.current.take() {
                Some(p) => self.answer(p, false, true).map(Some),
                None => Ok(None),
            };
        }
        let progress = match self.current.as_mut() {
            Some(p) => p.buffer.push(key),
            None => return Ok(None),
        };
        if progress == MatchProgress::Partial {
            return Ok(None);
        }
        match self.current.take() {
            Some(p) => self
                .answer(p, progress == MatchProgress::Complete, false)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Advance the turn clock. A timeout counts as a miss.
    pub fn on_tick(&mut self) -> Result<Option<Feedback>> {
        match self.phase {
            Phase::NothingDue => {
                self.present_next()?;
                Ok(None)
            }
            Phase::Presenting => {
                let event = self.current.as_mut().and_then(|p| p.timer.poll());
                if event != Some(TimerEvent::Completed) {
                    return Ok(None);
                }
                match self.current.take() {
                    Some(p) => self.answer(p, false, true).map(Some),
                    None => Ok(None),
                }
            }
            Phase::Ready | Phase::Finished => Ok(None),
        }
    }

    /// Stop the clock, fold this session into lifetime stats, and persist.
    pub fn finish(&mut self) -> Result<SessionStats> {
        if let Some(mut p) = self.current.take() {
            p.timer.stop();
        }
        self.phase = Phase::Finished;
        let stats = self.session.stats();

        if !self.saved {
            let mut lifetime = self.stats.clone();
            if stats.total_attempts > 0 {
                lifetime.absorb(&stats, self.now());
            }
            if self.config.save_progress {
                let record = ProgressRecord {
                    pack_id: self.deck.pack_id().to_string(),
                    commands: self.deck.states(),
                    stats: lifetime.clone(),
                };
                self.store.save(self.deck.pack_id(), &record)?;
            }
            // committed only once the record is stored
            self.stats = lifetime;
            self.saved = true;
            tracing::info!(
                score = stats.total_score,
                accuracy = stats.accuracy,
                best_combo = stats.best_combo,
                "session finished"
            );
        }
        Ok(stats)
    }

    /// Forget all saved progress for this pack and start the deck over.
    /// The session in flight is discarded, not saved.
    pub fn reset_progress(&mut self, pack: &Pack) -> Result<bool> {
        let removed = self.store.delete(&pack.id)?;
        self.deck = Deck::with_config(
            pack,
            &HashMap::new(),
            SrsConfig::default(),
            time_limits(&self.config),
        );
        self.stats = AggregateStats::default();
        self.clear_session();
        Ok(removed)
    }

    /// Begin a fresh session on the same deck. The previous one is finished first.
    pub fn restart(&mut self) -> Result<()> {
        self.finish()?;
        self.clear_session();
        self.start()
    }

    fn clear_session(&mut self) {
        if let Some(mut p) = self.current.take() {
            p.timer.stop();
        }
        self.session.reset();
        self.last_key = None;
        self.answered = 0;
        self.history.clear();
        self.saved = false;
        self.phase = Phase::Ready;
    }

    fn present_next(&mut self) -> Result<()> {
        if self.answered >= self.config.commands_per_session {
            self.finish()?;
            return Ok(());
        }

        let now = self.now();
        let next = self
            .deck
            .select_next(self.last_key.as_deref(), now, &mut self.rng)?
            .map(|c| c.keys().to_string());

        match next {
            Some(key) => {
                let max_time = self.deck.time_limit(&key)?;
                let mut timer = Timer::new(max_time, self.clock.clone());
                timer.start();
                tracing::debug!(command = %key, max_time, "presenting");
                self.current = Some(Presentation {
                    buffer: KeyBuffer::new(&key),
                    key,
                    timer,
                    max_time,
                });
                self.phase = Phase::Presenting;
            }
            None => {
                if self.phase != Phase::NothingDue {
                    tracing::debug!("nothing due");
                }
                self.phase = Phase::NothingDue;
            }
        }
        Ok(())
    }

    fn answer(
        &mut self,
        mut presentation: Presentation,
        correct: bool,
        timed_out: bool,
    ) -> Result<Feedback> {
        let remaining = presentation.timer.remaining();
        presentation.timer.stop();

        let now = self.now();
        let level = self
            .deck
            .get(&presentation.key)
            .map(|c| c.state.level)
            .unwrap_or(0);
        let new_state = self.deck.record(&presentation.key, correct, now)?;
        let outcome = self
            .session
            .record_attempt(correct, remaining, presentation.max_time, i64::from(level));

        let concept = self
            .deck
            .get(&presentation.key)
            .map(|c| c.def.concept.clone())
            .unwrap_or_default();
        let feedback = Feedback {
            keys: presentation.key.clone(),
            concept,
            correct,
            timed_out,
            score: outcome.score,
            combo: outcome.combo,
            level: new_state.level,
        };
        self.history.push(feedback.clone());
        self.answered += 1;
        self.last_key = Some(presentation.key);

        self.present_next()?;
        Ok(feedback)
    }
}

fn time_limits(config: &Config) -> TimeLimits {
    let scale = if config.time_scale.is_finite() && config.time_scale > 0.0 {
        config.time_scale
    } else {
        tracing::warn!(time_scale = config.time_scale, "time scale must be positive, using 1.0");
        1.0
    };
    TimeLimits {
        scale,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{MemoryProgressStore, StoreError};
    use crate::timer::ManualClock;
    use assert_matches::assert_matches;
    use std::cell::Cell;
    use std::io;
    use std::path::PathBuf;

    fn pack() -> Pack {
        Pack::from_json(
            r#"{
                "id": "mini", "name": "Mini", "version": "1",
                "groups": [ { "name": "g", "commands": [
                    { "keys": "dd", "concept": "delete line", "color": "red", "complexity": 1.0, "target_type": "line" },
                    { "keys": "ctrl+w v", "concept": "split", "color": "blue", "complexity": 1.0, "target_type": "window" }
                ] } ]
            }"#,
        )
        .unwrap()
    }

    fn game(per_session: usize) -> (Game<MemoryProgressStore>, ManualClock) {
        let clock = ManualClock::new();
        let config = Config {
            commands_per_session: per_session,
            ..Default::default()
        };
        let game = Game::new(&pack(), MemoryProgressStore::new(), &config, Arc::new(clock.clone()))
            .unwrap()
            .with_seed(11);
        (game, clock)
    }

    fn type_current(game: &mut Game<MemoryProgressStore>) -> Option<Feedback> {
        let keys = game.current_command().unwrap().keys().to_string();
        let mut last = None;
        for k in crate::keys::parse_sequence(&keys) {
            last = game.handle_key(&k).unwrap();
        }
        last
    }

    #[test]
    fn test_start_presents_a_command() {
        let (mut game, _clock) = game(5);
        assert_eq!(game.phase(), Phase::Ready);
        game.start().unwrap();
        assert_eq!(game.phase(), Phase::Presenting);
        assert!(game.current_command().is_some());
        assert_eq!(game.remaining(), 8.0);
    }

    #[test]
    fn test_correct_answer_scores() {
        let (mut game, clock) = game(5);
        game.start().unwrap();
        clock.advance_secs(4.0);
        let fb = type_current(&mut game).unwrap();
        assert!(fb.correct);
        // half the time left: (100 + 25) * 1 * 1
        assert_eq!(fb.score, 125);
        assert_eq!(game.stats().correct_count, 1);
    }

    #[test]
    fn test_wrong_key_is_a_miss() {
        let (mut game, _clock) = game(5);
        game.start().unwrap();
        let fb = game.handle_key("q").unwrap().unwrap();
        assert!(!fb.correct);
        assert!(!fb.timed_out);
        assert_eq!(fb.score, 0);
        assert_eq!(game.deck().get(&fb.keys).unwrap().state.failures, 1);
    }

    #[test]
    fn test_timeout_is_a_miss() {
        let (mut game, clock) = game(5);
        game.start().unwrap();
        let first = game.current_command().unwrap().keys().to_string();
        clock.advance_secs(3.0);
        assert_eq!(game.on_tick().unwrap(), None);
        clock.advance_secs(6.0);
        let fb = game.on_tick().unwrap().unwrap();
        assert!(fb.timed_out);
        assert_eq!(fb.keys, first);
        assert_eq!(game.stats().incorrect_count, 1);
        assert_eq!(game.phase(), Phase::Presenting);
    }

    #[test]
    fn test_no_immediate_repeat() {
        let (mut game, _clock) = game(10);
        game.start().unwrap();
        let mut previous = game.current_command().unwrap().keys().to_string();
        for _ in 0..4 {
            type_current(&mut game);
            let now = game.current_command().unwrap().keys().to_string();
            assert_ne!(now, previous);
            previous = now;
        }
    }

    #[test]
    fn test_paused_game_ignores_keys_and_time() {
        let (mut game, clock) = game(5);
        game.start().unwrap();
        game.toggle_pause();
        assert!(game.is_paused());
        clock.advance_secs(100.0);
        assert_eq!(game.on_tick().unwrap(), None);
        assert_eq!(game.handle_key("d").unwrap(), None);
        assert_eq!(game.remaining(), 8.0);
        game.toggle_pause();
        assert!(!game.is_paused());
    }

    #[test]
    fn test_session_finishes_and_saves() {
        let (mut game, _clock) = game(3);
        game.start().unwrap();
        for _ in 0..3 {
            type_current(&mut game);
        }
        assert_eq!(game.phase(), Phase::Finished);
        assert!(game.current_command().is_none());

        let record = game.store.load("mini").unwrap();
        assert_eq!(record.stats.sessions_played, 1);
        assert_eq!(record.stats.total_correct, 3);
        assert_eq!(record.commands.len(), 2);

        // finishing again does not double count
        game.finish().unwrap();
        assert_eq!(game.store.load("mini").unwrap().stats.sessions_played, 1);
    }

    #[test]
    fn test_restart_keeps_deck_and_clears_session() {
        let (mut game, _clock) = game(2);
        game.start().unwrap();
        type_current(&mut game);
        game.restart().unwrap();
        assert_eq!(game.phase(), Phase::Presenting);
        assert_eq!(game.answered(), 0);
        assert_eq!(game.stats().total_attempts, 0);
        assert_eq!(game.lifetime().sessions_played, 1);
        assert!(game.deck().commands().iter().any(|c| c.state.successes == 1));
    }

    #[test]
    fn test_keys_after_deadline_are_a_timeout() {
        let (mut game, clock) = game(5);
        game.start().unwrap();
        let first = game.current_command().unwrap().keys().to_string();
        clock.advance_secs(30.0);

        let token = crate::keys::parse_sequence(&first).remove(0);
        let fb = game.handle_key(&token).unwrap().unwrap();
        assert_eq!(fb.keys, first);
        assert!(!fb.correct);
        assert!(fb.timed_out);
        assert_eq!(fb.score, 0);
        let state = &game.deck().get(&first).unwrap().state;
        assert_eq!(state.successes, 0);
        assert_eq!(state.failures, 1);
        assert_eq!(game.stats().incorrect_count, 1);
    }

    #[test]
    fn test_non_positive_time_scale_falls_back() {
        for bad in [0.0, -2.0, f64::NAN] {
            let config = Config {
                time_scale: bad,
                ..Default::default()
            };
            assert_eq!(time_limits(&config).scale, 1.0);
        }
        let config = Config {
            time_scale: 0.5,
            ..Default::default()
        };
        assert_eq!(time_limits(&config).scale, 0.5);
    }

    #[derive(Default)]
    struct FlakyStore {
        failing: Cell<bool>,
        inner: MemoryProgressStore,
    }

    impl ProgressStore for FlakyStore {
        fn load(&self, pack_id: &str) -> Result<ProgressRecord, StoreError> {
            self.inner.load(pack_id)
        }

        fn save(&self, pack_id: &str, record: &ProgressRecord) -> Result<(), StoreError> {
            if self.failing.get() {
                return Err(StoreError::Io {
                    path: PathBuf::from("progress.db"),
                    source: io::Error::new(io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save(pack_id, record)
        }

        fn delete(&self, pack_id: &str) -> Result<bool, StoreError> {
            self.inner.delete(pack_id)
        }
    }

    #[test]
    fn test_failed_save_is_retried_on_next_finish() {
        let store = FlakyStore {
            failing: Cell::new(true),
            ..Default::default()
        };
        let config = Config {
            commands_per_session: 5,
            ..Default::default()
        };
        let mut game = Game::new(&pack(), store, &config, Arc::new(ManualClock::new()))
            .unwrap()
            .with_seed(11);
        game.start().unwrap();
        game.handle_key("q").unwrap();

        assert_matches!(
            game.finish(),
            Err(crate::Error::Store(StoreError::Io { .. }))
        );
        assert_eq!(game.lifetime().sessions_played, 0);

        game.store.failing.set(false);
        game.finish().unwrap();
        assert_eq!(game.lifetime().sessions_played, 1);
        let record = game.store.load("mini").unwrap();
        assert_eq!(record.stats.sessions_played, 1);
        assert_eq!(record.stats.total_incorrect, 1);

        game.finish().unwrap();
        assert_eq!(game.store.load("mini").unwrap().stats.sessions_played, 1);
    }

    #[test]
    fn test_reset_progress() {
        let (mut game, _clock) = game(5);
        game.start().unwrap();
        type_current(&mut game);
        game.finish().unwrap();
        game.restart().unwrap();
        type_current(&mut game);

        assert!(game.reset_progress(&pack()).unwrap());
        assert!(game
            .deck()
            .commands()
            .iter()
            .all(|c| c.state == Default::default()));
        assert_eq!(game.phase(), Phase::Ready);
        assert!(game.current_command().is_none());
        assert_eq!(game.answered(), 0);
        assert_eq!(game.stats().total_attempts, 0);
        assert_eq!(game.lifetime(), &AggregateStats::default());
        assert!(game.history().is_empty());
        assert!(!game.reset_progress(&pack()).unwrap());
    }
}
