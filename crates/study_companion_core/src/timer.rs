//! crates/study_companion_core/src/timer.rs
//!
//! The study/rest cycle timer used by the Pomodoro study style.
//!
//! The timer is an owned value, not a global: whoever runs the study session
//! creates it and hands subscribers a `watch::Receiver`. Time is passed in
//! explicitly, so the owner decides how often to `tick`.

use std::time::{Duration, Instant};
use tokio::sync::watch;

pub const DEFAULT_STUDY_PERIOD: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_REST_PERIOD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Study,
    Rest,
}

/// What subscribers see after every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    pub remaining: Duration,
    pub running: bool,
    /// Completed study periods since the last reset.
    pub cycles: u32,
}

impl TimerSnapshot {
    /// `mm:ss` of the remaining time, rounded up to the next second.
    pub fn clock(&self) -> String {
        let secs = self.remaining.as_secs() + u64::from(self.remaining.subsec_nanos() > 0);
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

pub struct StudyTimer {
    study_period: Duration,
    rest_period: Duration,
    state: TimerSnapshot,
    running_since: Option<Instant>,
    updates: watch::Sender<TimerSnapshot>,
}

impl StudyTimer {
    pub fn new(study_period: Duration, rest_period: Duration) -> Self {
        let state = TimerSnapshot {
            phase: TimerPhase::Study,
            remaining: study_period,
            running: false,
            cycles: 0,
        };
        let (updates, _) = watch::channel(state);
        Self { study_period, rest_period, state, running_since: None, updates }
    }

    pub fn pomodoro() -> Self {
        Self::new(DEFAULT_STUDY_PERIOD, DEFAULT_REST_PERIOD)
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.state
    }

    pub fn start(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
            self.state.running = true;
            self.publish();
        }
    }

    /// Stops the countdown, keeping the remaining time.
    pub fn pause(&mut self, now: Instant) {
        if self.running_since.is_some() {
            self.tick(now);
            self.running_since = None;
            self.state.running = false;
            self.publish();
        }
    }

    /// Back to a stopped, full study period.
    pub fn reset(&mut self) {
        self.running_since = None;
        self.state = TimerSnapshot {
            phase: TimerPhase::Study,
            remaining: self.study_period,
            running: false,
            cycles: 0,
        };
        self.publish();
    }

    /// Advances the countdown to `now`, switching phases as periods run out.
    pub fn tick(&mut self, now: Instant) {
        let Some(since) = self.running_since else {
            return;
        };
        let mut elapsed = now.saturating_duration_since(since);
        self.running_since = Some(now);

        if elapsed >= self.state.remaining {
            elapsed -= self.state.remaining;
            self.switch_phase();
            let cycle = self.study_period + self.rest_period;
            if cycle.is_zero() {
                // Zero-length periods would never consume `elapsed`.
                elapsed = Duration::ZERO;
            } else {
                // Whole study/rest cycles land back in the same phase.
                let full = elapsed.as_nanos() / cycle.as_nanos();
                self.state.cycles = self
                    .state
                    .cycles
                    .saturating_add(u32::try_from(full).unwrap_or(u32::MAX));
                elapsed = Duration::from_nanos((elapsed.as_nanos() % cycle.as_nanos()) as u64);
            }
            while elapsed >= self.state.remaining && !self.state.remaining.is_zero() {
                elapsed -= self.state.remaining;
                self.switch_phase();
            }
            elapsed = elapsed.min(self.state.remaining);
        }
        self.state.remaining -= elapsed;
        self.publish();
    }

    fn switch_phase(&mut self) {
        match self.state.phase {
            TimerPhase::Study => {
                self.state.cycles = self.state.cycles.saturating_add(1);
                self.state.phase = TimerPhase::Rest;
                self.state.remaining = self.rest_period;
            }
            TimerPhase::Rest => {
                self.state.phase = TimerPhase::Study;
                self.state.remaining = self.study_period;
            }
        }
    }

    fn publish(&self) {
        self.updates.send_replace(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn counts_down_only_while_running() {
        let t0 = Instant::now();
        let mut timer = StudyTimer::pomodoro();
        timer.tick(t0 + mins(10));
        assert_eq!(timer.snapshot().remaining, mins(30));

        timer.start(t0);
        timer.tick(t0 + mins(10));
        timer.pause(t0 + mins(12));
        timer.tick(t0 + mins(20));
        let snap = timer.snapshot();
        assert_eq!(snap.remaining, mins(18));
        assert!(!snap.running);
        assert_eq!(snap.clock(), "18:00");
    }

    #[test]
    fn rolls_over_into_rest_and_back() {
        let t0 = Instant::now();
        let mut timer = StudyTimer::pomodoro();
        timer.start(t0);
        timer.tick(t0 + mins(31));
        let snap = timer.snapshot();
        assert_eq!(snap.phase, TimerPhase::Rest);
        assert_eq!(snap.remaining, mins(4));
        assert_eq!(snap.cycles, 1);

        timer.tick(t0 + mins(36));
        assert_eq!(timer.snapshot().phase, TimerPhase::Study);
        assert_eq!(timer.snapshot().remaining, mins(29));
    }

    #[test]
    fn subscribers_see_every_change() {
        let t0 = Instant::now();
        let mut timer = StudyTimer::new(mins(1), mins(1));
        let mut rx = timer.subscribe();
        timer.start(t0);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().running);

        timer.reset();
        let snap = *rx.borrow_and_update();
        assert!(!snap.running);
        assert_eq!(snap.remaining, mins(1));
    }

    #[test]
    fn long_gaps_skip_whole_cycles() {
        let t0 = Instant::now();
        let mut timer = StudyTimer::new(Duration::from_millis(1), Duration::from_millis(1));
        timer.start(t0);
        timer.tick(t0 + Duration::from_secs(86_400) + Duration::from_micros(1_500));
        let snap = timer.snapshot();
        assert_eq!(snap.cycles, 43_200_001);
        assert_eq!(snap.phase, TimerPhase::Rest);
        assert_eq!(snap.remaining, Duration::from_micros(500));

        let mut rolled = StudyTimer::new(Duration::from_nanos(1), Duration::from_nanos(1));
        rolled.state.cycles = u32::MAX - 1;
        rolled.start(t0);
        rolled.tick(t0 + Duration::from_secs(10));
        assert_eq!(rolled.snapshot().cycles, u32::MAX);
    }

    #[test]
    fn clock_rounds_partial_seconds_up() {
        let snap = TimerSnapshot {
            phase: TimerPhase::Study,
            remaining: Duration::from_millis(61_200),
            running: true,
            cycles: 0,
        };
        assert_eq!(snap.clock(), "01:02");
    }
}
