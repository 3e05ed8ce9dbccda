use std::fmt;
use std::time::Duration;

/// Handle for a scheduled timer. Ids are never reused by a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Clock and timer primitive injected into the engine.
///
/// Implementations only *arm* timers; expirations are delivered back to the controller by the
/// driver through `ConnectionController::handle_timer`. After `cancel` an id must not be
/// delivered again, although the controller tolerates late deliveries.
pub trait TimerScheduler {
    /// Monotonic milliseconds.
    fn now_ms(&self) -> u64;

    fn schedule_once(&mut self, delay: Duration) -> TimerId;

    fn schedule_repeating(&mut self, period: Duration) -> TimerId;

    fn cancel(&mut self, id: TimerId);
}

/// Duration as whole milliseconds, saturating at `u64::MAX`.
#[inline]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
