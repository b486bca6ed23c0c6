//! Accumulator contract and the receiver's error side channel.
//!
//! The collector cycle hands metrics to an [`Accumulator`]. Parse failures
//! happen on the receiver thread, outside any collector cycle, so they are
//! queued on an [`ErrorSender`] and relayed to the accumulator by the next
//! cycle.

mod channel;
mod memory;

pub use channel::ChannelAccumulator;
pub use memory::MemoryAccumulator;

use crate::core::{FieldSet, KeruuError, Metric, TagSet};
use crate::monitoring::{ConsumerCounters, RateLimitedLogger};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Capacity of the receiver error channel
pub const ERROR_CHANNEL_CAPACITY: usize = 1024;

/// Downstream sink for finalized metrics and errors
pub trait Accumulator: Send {
    /// Accept one metric
    fn add_fields(&mut self, measurement: &str, fields: FieldSet, tags: TagSet, timestamp: DateTime<Utc>);

    /// Accept an error reported by the plugin
    fn add_error(&mut self, error: KeruuError);

    /// Accept a whole metric
    fn add_metric(&mut self, metric: Metric) {
        let (name, tags, fields, timestamp) = metric.into_parts();
        self.add_fields(&name, fields, tags, timestamp);
    }
}

/// Create the bounded error channel used by the receiver loop
pub fn error_channel(capacity: usize, counters: Arc<ConsumerCounters>) -> (ErrorSender, ErrorReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let sender = ErrorSender {
        tx,
        counters,
        drop_log: Arc::new(RateLimitedLogger::warnings()),
    };
    (sender, ErrorReceiver { rx })
}

/// Thread-safe reporting end of the error channel
#[derive(Clone)]
pub struct ErrorSender {
    tx: Sender<KeruuError>,
    counters: Arc<ConsumerCounters>,
    drop_log: Arc<RateLimitedLogger>,
}

impl ErrorSender {
    /// Queue an error for the next collector cycle; never blocks.
    ///
    /// Returns false if the error was lost because the channel is full.
    pub fn report(&self, error: KeruuError) -> bool {
        match self.tx.try_send(error) {
            Ok(()) => true,
            Err(TrySendError::Full(error)) => {
                ConsumerCounters::incr(&self.counters.errors_dropped);
                self.drop_log.record("error channel full, dropping error", &error);
                false
            },
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Relaying end of the error channel
pub struct ErrorReceiver {
    rx: Receiver<KeruuError>,
}

impl ErrorReceiver {
    /// Hand the errors queued right now to the accumulator; returns how many.
    ///
    /// Errors reported while the relay runs wait for the next call.
    pub fn relay(&self, acc: &mut dyn Accumulator) -> usize {
        let n = self.rx.len();
        let mut relayed = 0;
        for _ in 0..n {
            match self.rx.try_recv() {
                Ok(error) => {
                    acc.add_error(error);
                    relayed += 1;
                },
                Err(_) => break,
            }
        }
        relayed
    }

    /// Errors waiting to be relayed
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no errors are waiting
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct SlowAccumulator {
        errors: usize,
    }

    impl Accumulator for SlowAccumulator {
        fn add_fields(&mut self, _: &str, _: FieldSet, _: TagSet, _: DateTime<Utc>) {}

        fn add_error(&mut self, _error: KeruuError) {
            self.errors += 1;
            std::thread::sleep(Duration::from_micros(50));
        }
    }

    #[test]
    fn test_add_metric_splits_into_fields() {
        let mut acc = MemoryAccumulator::new();
        let metric = Metric::builder("cpu").tag("host", "a").field("usage", 1.5).build().unwrap();
        let expected = metric.clone();

        acc.add_metric(metric);
        assert_eq!(acc.metrics(), &[expected]);
    }

    #[test]
    fn test_error_channel_relays_in_order() {
        let counters = Arc::new(ConsumerCounters::default());
        let (tx, rx) = error_channel(4, counters);

        assert!(tx.report(KeruuError::parse("first")));
        assert!(tx.report(KeruuError::parse("second")));
        assert_eq!(rx.len(), 2);

        let mut acc = MemoryAccumulator::new();
        assert_eq!(rx.relay(&mut acc), 2);
        assert!(rx.is_empty());

        let messages: Vec<String> = acc.errors().iter().map(ToString::to_string).collect();
        assert_eq!(messages, vec!["Parse error: first", "Parse error: second"]);
    }

    #[test]
    fn test_full_error_channel_counts_drops() {
        let counters = Arc::new(ConsumerCounters::default());
        let (tx, _rx) = error_channel(1, Arc::clone(&counters));

        assert!(tx.report(KeruuError::parse("kept")));
        assert!(!tx.report(KeruuError::parse("lost")));
        assert!(!tx.report(KeruuError::parse("lost again")));
        assert_eq!(counters.errors_dropped.load(Ordering::Relaxed), 2);
        assert_eq!(tx.drop_log.total_count(), 2);
        assert_eq!(tx.drop_log.pending_count(), 1, "second drop inside the interval is suppressed");
    }

    #[test]
    fn test_relay_is_bounded_by_snapshot() {
        let counters = Arc::new(ConsumerCounters::default());
        let (tx, rx) = error_channel(16, counters);
        for i in 0..16 {
            assert!(tx.report(KeruuError::parse(format!("queued {}", i))));
        }

        let running = Arc::new(AtomicBool::new(true));
        let producer = {
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    tx.report(KeruuError::parse("flood"));
                }
            })
        };

        let mut acc = SlowAccumulator { errors: 0 };
        let relayed = rx.relay(&mut acc);
        running.store(false, Ordering::Relaxed);
        producer.join().unwrap();

        assert!(relayed <= 16, "relayed {} errors from a 16-slot channel", relayed);
        assert_eq!(acc.errors, relayed);
    }
}
