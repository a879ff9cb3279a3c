//! Countdown clock for a single command presentation.
//!
//! The timer owns no thread. The runtime's tick source calls [`Timer::poll`]
//! on every tick; remaining time is derived from the injected [`Clock`], so
//! the tick cadence only affects how often callbacks fire, never accuracy.
//!
//! ```text
//! Idle -> Running <-> Paused
//!    \        |         /
//!     `--> Stopped <---'
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + *offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// What a poll observed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerEvent {
    Tick(f64),
    Completed,
}

/// Cloneable handle that stops a timer from anywhere, including its own callbacks.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type TickFn = Box<dyn FnMut(f64)>;
type CompleteFn = Box<dyn FnOnce()>;

pub struct Timer {
    total: f64,
    /// Remaining seconds as of `resumed_at` (or frozen, when not running)
    banked: f64,
    resumed_at: Option<Instant>,
    state: TimerState,
    stop: StopHandle,
    clock: Arc<dyn Clock>,
    on_tick: Option<TickFn>,
    on_complete: Option<CompleteFn>,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("total", &self.total)
            .field("remaining", &self.remaining())
            .field("state", &self.state())
            .finish()
    }
}

impl Timer {
    pub fn new(seconds: f64, clock: Arc<dyn Clock>) -> Self {
        let total = seconds.max(0.0);
        Self {
            total,
            banked: total,
            resumed_at: None,
            state: TimerState::Idle,
            stop: StopHandle::default(),
            clock,
            on_tick: None,
            on_complete: None,
        }
    }

    pub fn with_system_clock(seconds: f64) -> Self {
        Self::new(seconds, Arc::new(SystemClock))
    }

    /// Called with the remaining seconds on every poll while running
    pub fn on_tick(mut self, f: impl FnMut(f64) + 'static) -> Self {
        self.on_tick = Some(Box::new(f));
        self
    }

    /// Called once when the countdown reaches zero
    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> TimerState {
        if self.stop.is_stopped() {
            TimerState::Stopped
        } else {
            self.state
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_active(&self) -> bool {
        self.state() == TimerState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TimerState::Paused
    }

    pub fn remaining(&self) -> f64 {
        match self.state() {
            TimerState::Stopped => 0.0,
            TimerState::Idle | TimerState::Paused => self.banked.max(0.0),
            TimerState::Running => self.live_remaining(),
        }
    }

    /// 0.0 .. 1.0 of the allotted time still left
    pub fn fraction_remaining(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        (self.remaining() / self.total).clamp(0.0, 1.0)
    }

    pub fn start(&mut self) {
        self.sync_stop();
        match self.state {
            TimerState::Idle | TimerState::Paused => {
                self.resumed_at = Some(self.clock.now());
                self.state = TimerState::Running;
            }
            TimerState::Running | TimerState::Stopped => {}
        }
    }

    pub fn pause(&mut self) {
        self.sync_stop();
        if self.state == TimerState::Running {
            self.banked = self.live_remaining();
            self.resumed_at = None;
            self.state = TimerState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.stop.stop();
        self.sync_stop();
    }

    /// Grow or shrink the allotment; remaining time never drops below zero.
    pub fn add_time(&mut self, delta: f64) {
        self.sync_stop();
        self.total = (self.total + delta).max(0.0);
        match self.state {
            TimerState::Running => {
                self.banked = (self.live_remaining() + delta).max(0.0);
                self.resumed_at = Some(self.clock.now());
            }
            TimerState::Idle | TimerState::Paused => {
                self.banked = (self.banked + delta).max(0.0);
            }
            TimerState::Stopped => {}
        }
    }

    /// Advance the countdown, firing callbacks. Returns what happened, if anything.
    pub fn poll(&mut self) -> Option<TimerEvent> {
        self.sync_stop();
        if self.state != TimerState::Running {
            return None;
        }

        let remaining = self.live_remaining();
        if let Some(tick) = self.on_tick.as_mut() {
            tick(remaining);
        }
        if self.stop.is_stopped() {
            self.sync_stop();
            return None;
        }
        if remaining > 0.0 {
            return Some(TimerEvent::Tick(remaining));
        }

        tracing::debug!(total = self.total, "timer expired");
        let on_complete = self.on_complete.take();
        self.stop.stop();
        self.sync_stop();
        if let Some(complete) = on_complete {
            complete();
        }
        Some(TimerEvent::Completed)
    }

    fn live_remaining(&self) -> f64 {
        let elapsed = self
            .resumed_at
            .map(|at| self.clock.now().saturating_duration_since(at).as_secs_f64())
            .unwrap_or(0.0);
        (self.banked - elapsed).max(0.0)
    }

    fn sync_stop(&mut self) {
        if self.stop.is_stopped() && self.state != TimerState::Stopped {
            self.state = TimerState::Stopped;
            self.banked = 0.0;
            self.resumed_at = None;
            self.on_tick = None;
            self.on_complete = None;
        }
    }
}
