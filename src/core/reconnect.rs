use std::time::Duration;

use super::timer::{TimerId, TimerScheduler, duration_ms};

/// Exponential backoff.
///
/// Growth is applied to the stored delay; the configured maximum clamps the value only when it
/// is handed out. Delays are whole milliseconds and round down.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    initial_ms: u64,
    max_ms: u64,
    factor: f64,
    current_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.5
        };
        let initial_ms = duration_ms(initial);
        Self {
            initial_ms,
            max_ms: duration_ms(max),
            factor,
            current_ms: initial_ms,
        }
    }

    /// Delay for this attempt, then grow the stored delay for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms.min(self.max_ms);
        let grown = (self.current_ms as f64 * self.factor).floor();
        self.current_ms = if grown >= u64::MAX as f64 {
            u64::MAX
        } else {
            grown as u64
        };
        Duration::from_millis(delay)
    }

    pub fn reset(&mut self) {
        self.current_ms = self.initial_ms;
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 1.5)
    }
}

/// Outcome of asking the scheduler for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Scheduled {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// The attempt budget is spent; nothing was armed.
    Exhausted { attempts: u32 },
}

/// Backoff retry scheduler with at most one armed timer.
#[derive(Debug)]
pub struct ReconnectionScheduler {
    backoff: ExponentialBackoff,
    attempts: u32,
    max_attempts: u32,
    pending: Option<TimerId>,
}

impl ReconnectionScheduler {
    pub fn new(max_attempts: u32, backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            attempts: 0,
            max_attempts,
            pending: None,
        }
    }

    /// Arm the next retry timer, or report exhaustion.
    ///
    /// An already-armed timer is replaced, never doubled.
    pub fn schedule<S: TimerScheduler>(&mut self, timers: &mut S) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: self.attempts,
            };
        }
        self.cancel(timers);

        self.attempts += 1;
        let delay = self.backoff.next_delay();
        self.pending = Some(timers.schedule_once(delay));
        ReconnectDecision::Scheduled {
            attempt: self.attempts,
            max_attempts: self.max_attempts,
            delay,
        }
    }

    /// Claim a timer expiry. Returns true when `id` is the armed retry timer.
    pub fn take_due(&mut self, id: TimerId) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn cancel<S: TimerScheduler>(&mut self, timers: &mut S) {
        if let Some(id) = self.pending.take() {
            timers.cancel(id);
        }
    }

    /// Cancel, zero the attempt count and restore the initial delay.
    pub fn reset<S: TimerScheduler>(&mut self, timers: &mut S) {
        self.cancel(timers);
        self.attempts = 0;
        self.backoff.reset();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
