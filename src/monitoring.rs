//! Counters and rate-limited logging for the delivery pipeline.
//!
//! Drops and parse failures can happen thousands of times per second under
//! sustained overload. Every occurrence is counted, but log lines are
//! emitted at most once per interval with the number of suppressed events.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval for rate-limited logging
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum payload length included in log messages and error reports
pub const MAX_PAYLOAD_LOG_LENGTH: usize = 256;

/// Render a payload for logs, truncated to [`MAX_PAYLOAD_LOG_LENGTH`] bytes.
pub fn payload_preview(data: &[u8]) -> String {
    if data.len() > MAX_PAYLOAD_LOG_LENGTH {
        format!(
            "{}... (truncated from {} bytes)",
            String::from_utf8_lossy(&data[..MAX_PAYLOAD_LOG_LENGTH]),
            data.len()
        )
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}

/// Log level used by a [`RateLimitedLogger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// `tracing::warn!`
    Warn,
    /// `tracing::error!`
    Error,
}

/// Logger that emits at most one line per interval.
///
/// Thread-safe: counters are atomic and only the last log time sits
/// behind a mutex.
pub struct RateLimitedLogger {
    severity: Severity,
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    /// Events since the last emitted line
    pending: AtomicU64,
    /// Events ever recorded
    total: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a logger with the given level and interval
    pub fn new(severity: Severity, min_interval: Duration) -> Self {
        Self {
            severity,
            min_interval,
            last_log_time: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Warning logger with the default interval
    pub fn warnings() -> Self {
        Self::new(Severity::Warn, DEFAULT_LOG_INTERVAL)
    }

    /// Error logger with the default interval
    pub fn errors() -> Self {
        Self::new(Severity::Error, DEFAULT_LOG_INTERVAL)
    }

    /// Record an event and emit a line if the interval has elapsed.
    ///
    /// Returns true if a line was emitted.
    pub fn record(&self, message: &str, detail: &dyn std::fmt::Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.should_log() {
            return false;
        }

        let suppressed = self.pending.swap(0, Ordering::Relaxed).saturating_sub(1);
        match self.severity {
            Severity::Warn => tracing::warn!(
                context = %message,
                detail = %detail,
                suppressed_count = suppressed,
                total,
                "rate-limited warning"
            ),
            Severity::Error => tracing::error!(
                context = %message,
                error = %detail,
                suppressed_count = suppressed,
                total_errors = total,
                "rate-limited error"
            ),
        }
        true
    }

    /// Record an event carrying raw data; the data is truncated before logging.
    pub fn record_with_data(
        &self,
        message: &str,
        detail: &dyn std::fmt::Display,
        data: &[u8],
    ) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.should_log() {
            return false;
        }

        let suppressed = self.pending.swap(0, Ordering::Relaxed).saturating_sub(1);
        let preview = payload_preview(data);
        match self.severity {
            Severity::Warn => tracing::warn!(
                context = %message,
                detail = %detail,
                data = %preview,
                suppressed_count = suppressed,
                total,
                "rate-limited warning with data"
            ),
            Severity::Error => tracing::error!(
                context = %message,
                error = %detail,
                data = %preview,
                suppressed_count = suppressed,
                total_errors = total,
                "rate-limited error with data"
            ),
        }
        true
    }

    fn should_log(&self) -> bool {
        let mut last_time = self.last_log_time.lock();
        let now = Instant::now();

        match *last_time {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                *last_time = Some(now);
                true
            },
        }
    }

    /// Events recorded since the last emitted line
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Events ever recorded
    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Live counters of one consumer instance
#[derive(Debug, Default)]
pub struct ConsumerCounters {
    /// Raw messages accepted into the message queue
    pub messages_received: AtomicU64,
    /// Raw messages dropped because the message queue was full
    pub messages_dropped: AtomicU64,
    /// Messages discarded because they failed to parse
    pub parse_errors: AtomicU64,
    /// Errors lost because the error channel was full
    pub errors_dropped: AtomicU64,
    /// Metrics accepted into the metric buffer
    pub metrics_buffered: AtomicU64,
    /// Metrics dropped because the metric buffer was full
    pub metrics_dropped: AtomicU64,
    /// Metrics handed to an accumulator
    pub metrics_gathered: AtomicU64,
    /// Completed collector cycles
    pub gather_cycles: AtomicU64,
}

impl ConsumerCounters {
    /// Increment a counter by one
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self, buffered_now: usize, capacity: usize) -> ConsumerStats {
        ConsumerStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            errors_dropped: self.errors_dropped.load(Ordering::Relaxed),
            metrics_buffered: self.metrics_buffered.load(Ordering::Relaxed),
            metrics_dropped: self.metrics_dropped.load(Ordering::Relaxed),
            metrics_gathered: self.metrics_gathered.load(Ordering::Relaxed),
            gather_cycles: self.gather_cycles.load(Ordering::Relaxed),
            buffer_len: buffered_now,
            buffer_capacity: capacity,
        }
    }
}

/// Snapshot of consumer counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub parse_errors: u64,
    pub errors_dropped: u64,
    pub metrics_buffered: u64,
    pub metrics_dropped: u64,
    pub metrics_gathered: u64,
    pub gather_cycles: u64,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
}

impl ConsumerStats {
    /// Buffer utilization (0.0-1.0)
    pub fn utilization(&self) -> f64 {
        if self.buffer_capacity == 0 {
            return 0.0;
        }
        self.buffer_len as f64 / self.buffer_capacity as f64
    }
}
