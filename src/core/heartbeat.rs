use std::time::Duration;

use super::timer::{TimerId, TimerScheduler};

/// What a heartbeat timer expiry means for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatSignal {
    /// Interval tick: send a probe, then report it with `probe_sent`.
    Probe,
    /// No acknowledgment arrived in time. Reported once per armed timeout.
    Timeout,
}

/// Periodic liveness probe.
///
/// The monitor owns the interval and timeout timers but never touches the transport: the
/// controller sends the probe and acts on a timeout.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    interval_timer: Option<TimerId>,
    timeout_timer: Option<TimerId>,
    last_probe_at: Option<u64>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            interval_timer: None,
            timeout_timer: None,
            last_probe_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    pub fn is_running(&self) -> bool {
        self.interval_timer.is_some()
    }

    /// Arm the interval timer. No-op when disabled or already running.
    pub fn start<S: TimerScheduler>(&mut self, timers: &mut S) {
        if !self.is_enabled() || self.is_running() {
            return;
        }
        self.interval_timer = Some(timers.schedule_repeating(self.interval));
    }

    /// Classify a timer expiry. Ids this monitor does not own yield `None`.
    pub fn on_timer(&mut self, id: TimerId) -> Option<HeartbeatSignal> {
        if self.interval_timer == Some(id) {
            return Some(HeartbeatSignal::Probe);
        }
        if self.timeout_timer == Some(id) {
            self.timeout_timer = None;
            return Some(HeartbeatSignal::Timeout);
        }
        None
    }

    /// Record a successfully sent probe and arm the acknowledgment timeout if none is pending.
    pub fn probe_sent<S: TimerScheduler>(&mut self, now_ms: u64, timers: &mut S) {
        if !self.is_running() {
            return;
        }
        self.last_probe_at = Some(now_ms);
        if self.timeout_timer.is_none() {
            self.timeout_timer = Some(timers.schedule_once(self.timeout));
        }
    }

    /// Cancel the pending timeout and return the probe round-trip time.
    ///
    /// Returns `None` when no probe is outstanding.
    pub fn handle_probe_ack<S: TimerScheduler>(
        &mut self,
        now_ms: u64,
        timers: &mut S,
    ) -> Option<Duration> {
        if let Some(id) = self.timeout_timer.take() {
            timers.cancel(id);
        }
        let sent_at = self.last_probe_at.take()?;
        Some(Duration::from_millis(now_ms.saturating_sub(sent_at)))
    }

    pub fn stop<S: TimerScheduler>(&mut self, timers: &mut S) {
        if let Some(id) = self.interval_timer.take() {
            timers.cancel(id);
        }
        if let Some(id) = self.timeout_timer.take() {
            timers.cancel(id);
        }
        self.last_probe_at = None;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::VirtualTimers;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn disabled_monitor_never_arms() {
        let mut timers = VirtualTimers::new();
        let mut monitor = HeartbeatMonitor::new(Duration::ZERO, ms(100));
        monitor.start(&mut timers);
        assert!(!monitor.is_running());
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn unanswered_probe_times_out_once() {
        let mut timers = VirtualTimers::new();
        let mut monitor = HeartbeatMonitor::new(ms(100), ms(50));
        monitor.start(&mut timers);

        let due = timers.advance_due(ms(100));
        assert_eq!(monitor.on_timer(due[0]), Some(HeartbeatSignal::Probe));
        monitor.probe_sent(timers.now_ms(), &mut timers);

        let due = timers.advance_due(ms(50));
        let signals: Vec<_> = due.iter().filter_map(|id| monitor.on_timer(*id)).collect();
        assert_eq!(signals, vec![HeartbeatSignal::Timeout]);
        assert_eq!(due.iter().filter_map(|id| monitor.on_timer(*id)).count(), 0);
    }

    #[test]
    fn ack_cancels_timeout_and_reports_latency() {
        let mut timers = VirtualTimers::new();
        let mut monitor = HeartbeatMonitor::new(ms(100), ms(50));
        monitor.start(&mut timers);

        let due = timers.advance_due(ms(100));
        assert_eq!(monitor.on_timer(due[0]), Some(HeartbeatSignal::Probe));
        monitor.probe_sent(timers.now_ms(), &mut timers);
        assert_eq!(timers.pending(), 2);

        timers.advance_due(ms(20));
        let latency = monitor.handle_probe_ack(timers.now_ms(), &mut timers);
        assert_eq!(latency, Some(ms(20)));
        assert_eq!(timers.pending(), 1);
        assert_eq!(monitor.handle_probe_ack(timers.now_ms(), &mut timers), None);
    }

    #[test]
    fn pending_timeout_is_not_rearmed_by_next_tick() {
        let mut timers = VirtualTimers::new();
        let mut monitor = HeartbeatMonitor::new(ms(10), ms(100));
        monitor.start(&mut timers);
        monitor.probe_sent(0, &mut timers);
        let armed = timers.armed_total();
        monitor.probe_sent(10, &mut timers);
        assert_eq!(timers.armed_total(), armed);
    }

    #[test]
    fn stop_clears_both_timers() {
        let mut timers = VirtualTimers::new();
        let mut monitor = HeartbeatMonitor::new(ms(100), ms(50));
        monitor.start(&mut timers);
        monitor.probe_sent(0, &mut timers);
        monitor.stop(&mut timers);
        monitor.stop(&mut timers);
        assert!(!monitor.is_running());
        assert_eq!(timers.pending(), 0);
    }
}
