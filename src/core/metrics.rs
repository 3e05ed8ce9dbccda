use std::time::Duration;

use hdrhistogram::Histogram;

use super::circular_buffer::CircularBuffer;

/// Read-only view of session metrics. Timestamps are session clock milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connected_at: Option<u64>,
    pub disconnected_at: Option<u64>,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_attempts: u64,
    pub successful_reconnects: u64,
    pub errors: u64,
    pub current_reconnect_delay: Duration,
    pub queue_size: usize,
    /// Mean over the rolling latency window.
    pub average_latency: Option<Duration>,
    pub last_latency: Option<Duration>,
    /// Lifetime percentiles.
    pub latency_p50: Option<Duration>,
    pub latency_p99: Option<Duration>,
    pub latency_samples: u64,
}

/// Counters and gauges for one session. Every `record_*` call is O(1).
#[derive(Debug)]
pub struct MetricsCollector {
    connected_at: Option<u64>,
    disconnected_at: Option<u64>,
    messages_sent: u64,
    messages_received: u64,
    reconnect_attempts: u64,
    successful_reconnects: u64,
    errors: u64,
    current_reconnect_delay: Duration,
    latencies: CircularBuffer<Duration>,
    latency_sum: Duration,
    latency_histogram: Histogram<u64>,
}

impl MetricsCollector {
    pub fn new(latency_window: usize) -> Self {
        Self {
            connected_at: None,
            disconnected_at: None,
            messages_sent: 0,
            messages_received: 0,
            reconnect_attempts: 0,
            successful_reconnects: 0,
            errors: 0,
            current_reconnect_delay: Duration::ZERO,
            latencies: CircularBuffer::new(latency_window),
            latency_sum: Duration::ZERO,
            latency_histogram: Histogram::new_with_bounds(1, 60_000_000, 3)
                .expect("histogram bounds are valid"),
        }
    }

    pub fn record_connected(&mut self, now_ms: u64) {
        self.connected_at = Some(now_ms);
    }

    pub fn record_disconnected(&mut self, now_ms: u64) {
        self.disconnected_at = Some(now_ms);
    }

    pub fn record_sent(&mut self) {
        self.messages_sent = self.messages_sent.saturating_add(1);
    }

    pub fn record_received(&mut self) {
        self.messages_received = self.messages_received.saturating_add(1);
    }

    pub fn record_error(&mut self) {
        self.errors = self.errors.saturating_add(1);
    }

    pub fn record_reconnect_attempt(&mut self, delay: Duration) {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.current_reconnect_delay = delay;
    }

    pub fn record_reconnect_success(&mut self) {
        self.successful_reconnects = self.successful_reconnects.saturating_add(1);
    }

    pub fn record_latency(&mut self, latency: Duration) {
        if let Some(evicted) = self.latencies.push(latency) {
            self.latency_sum = self.latency_sum.saturating_sub(evicted);
        }
        if self.latencies.capacity() > 0 {
            self.latency_sum = self.latency_sum.saturating_add(latency);
        }
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        let _ = self.latency_histogram.record(micros.max(1));
    }

    /// Zero the reconnect attempt count and the displayed reconnect delay.
    pub fn reset_reconnect_counters(&mut self) {
        self.reconnect_attempts = 0;
        self.current_reconnect_delay = Duration::ZERO;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.latencies.capacity());
    }

    /// Project the current values. `queue_size` is supplied by the owner of the queue.
    pub fn snapshot(&self, queue_size: usize) -> MetricsSnapshot {
        let average_latency = match self.latencies.len() {
            0 => None,
            n => Some(self.latency_sum / n as u32),
        };
        let samples = self.latency_histogram.len();
        let (latency_p50, latency_p99) = if samples == 0 {
            (None, None)
        } else {
            (
                Some(Duration::from_micros(
                    self.latency_histogram.value_at_percentile(50.0),
                )),
                Some(Duration::from_micros(
                    self.latency_histogram.value_at_percentile(99.0),
                )),
            )
        };

        MetricsSnapshot {
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            reconnect_attempts: self.reconnect_attempts,
            successful_reconnects: self.successful_reconnects,
            errors: self.errors,
            current_reconnect_delay: self.current_reconnect_delay,
            queue_size,
            average_latency,
            last_latency: self.latencies.back().copied(),
            latency_p50,
            latency_p99,
            latency_samples: samples,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(10)
    }
}
