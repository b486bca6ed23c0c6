//! Receiver loop bridging raw transport messages into buffered metrics.
//!
//! One loop thread runs per consumer. It waits on the message queue and a
//! done channel, parses each message, applies topic parsing and pushes the
//! result onto the metric buffer. It never blocks on the buffer: when the
//! buffer is full the metric is dropped and a rate-limited warning is logged.

pub mod topic;

pub use topic::{topic_matches, TopicParser, TopicParserSet};

use crate::accumulator::ErrorSender;
use crate::buffer::MetricBuffer;
use crate::core::{ConsumerConfig, KeruuError, Metric, Result};
use crate::monitoring::{payload_preview, ConsumerCounters, RateLimitedLogger, Severity};
use crate::parser::Parser;
use crate::queue::{MessageQueue, RawMessage};
use crossbeam_channel::{select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Lifecycle of a receiver loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverState {
    /// Not started yet
    Idle = 0,
    /// Waiting for messages
    Running = 1,
    /// Stop requested, finishing the in-flight message
    Draining = 2,
    /// Thread has exited
    Stopped = 3,
}

impl ReceiverState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    stopping: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ReceiverState::Idle as u8),
            stopping: AtomicBool::new(false),
        }
    }

    fn state(&self) -> ReceiverState {
        ReceiverState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ReceiverState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Everything one receiver loop owns while it runs.
pub struct ReceiverLoop {
    parser: Box<dyn Parser>,
    topics: TopicParserSet,
    buffer: Arc<MetricBuffer>,
    errors: ErrorSender,
    counters: Arc<ConsumerCounters>,
    drop_log: RateLimitedLogger,
    error_log: RateLimitedLogger,
    shared: Arc<Shared>,
}

impl ReceiverLoop {
    /// Create a loop; nothing runs until [`ReceiverLoop::spawn`]
    pub fn new(
        config: &ConsumerConfig,
        parser: Box<dyn Parser>,
        topics: TopicParserSet,
        buffer: Arc<MetricBuffer>,
        errors: ErrorSender,
        counters: Arc<ConsumerCounters>,
    ) -> Self {
        Self {
            parser,
            topics,
            buffer,
            errors,
            counters,
            drop_log: RateLimitedLogger::new(Severity::Warn, config.drop_warning_interval),
            error_log: RateLimitedLogger::new(Severity::Error, config.parse_error_log_interval),
            shared: Arc::new(Shared::new()),
        }
    }

    /// Current state of this loop
    pub fn state(&self) -> ReceiverState {
        self.shared.state()
    }

    /// Start the loop thread consuming `queue`
    pub fn spawn(self, queue: MessageQueue) -> Result<ReceiverHandle> {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        shared.set_state(ReceiverState::Running);

        let thread = std::thread::Builder::new()
            .name("keruu-receiver".to_string())
            .spawn(move || self.run(&queue, &done_rx));

        match thread {
            Ok(thread) => Ok(ReceiverHandle {
                shared,
                done: Some(done_tx),
                thread: Some(thread),
            }),
            Err(e) => {
                shared.set_state(ReceiverState::Stopped);
                Err(KeruuError::Io(e))
            },
        }
    }

    fn run(self, queue: &MessageQueue, done: &Receiver<()>) {
        tracing::debug!(parser = self.parser.name(), "receiver loop started");

        loop {
            select! {
                recv(queue.receiver()) -> message => match message {
                    Ok(message) => {
                        if self.shared.stopping.load(Ordering::Acquire) {
                            break;
                        }
                        self.handle(message);
                    },
                    Err(_) => break,
                },
                recv(done) -> _ => break,
            }
        }

        let discarded = queue.len();
        if discarded > 0 {
            tracing::debug!(discarded, "receiver stopped with queued messages");
        }
        self.shared.set_state(ReceiverState::Stopped);
        tracing::debug!("receiver loop stopped");
    }

    /// Parse one message and buffer its metrics
    fn handle(&self, message: RawMessage) {
        let metrics = match self.parser.parse(&message.payload) {
            Ok(metrics) => metrics,
            Err(e) => {
                ConsumerCounters::incr(&self.counters.parse_errors);
                self.report(&message, e);
                return;
            },
        };

        let metrics = match self.apply_topic_parsing(&message, metrics) {
            Ok(metrics) => metrics,
            Err(e) => {
                ConsumerCounters::incr(&self.counters.parse_errors);
                self.report(&message, e);
                return;
            },
        };

        for metric in metrics {
            if self.buffer.push(metric, Arc::clone(&message.topic)) {
                ConsumerCounters::incr(&self.counters.metrics_buffered);
            } else {
                ConsumerCounters::incr(&self.counters.metrics_dropped);
                self.drop_log.record("metric buffer full, dropping metric", &KeruuError::BufferFull);
            }
        }
    }

    fn apply_topic_parsing(&self, message: &RawMessage, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
        if self.topics.is_empty() {
            return Ok(metrics);
        }
        metrics
            .into_iter()
            .map(|metric| self.topics.apply(&message.topic, metric))
            .collect()
    }

    fn report(&self, message: &RawMessage, error: KeruuError) {
        let error = KeruuError::Message {
            topic: message.topic.to_string(),
            payload: payload_preview(&message.payload),
            reason: error.to_string(),
        };
        self.error_log
            .record_with_data("failed to parse message", &error, &message.payload);
        self.errors.report(error);
    }
}

/// Controls a running receiver loop.
pub struct ReceiverHandle {
    shared: Arc<Shared>,
    done: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Current state of the loop
    pub fn state(&self) -> ReceiverState {
        self.shared.state()
    }

    /// Signal the loop and wait for it to exit.
    ///
    /// Messages still queued are discarded. Calling this more than once is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.shared.stopping.store(true, Ordering::Release);
        // The loop may have exited on its own and already be Stopped
        let _ = self.shared.state.compare_exchange(
            ReceiverState::Running as u8,
            ReceiverState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        drop(self.done.take());

        if thread.join().is_err() {
            self.shared.set_state(ReceiverState::Stopped);
            return Err(KeruuError::invalid_state("receiver thread panicked"));
        }
        Ok(())
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "receiver stop failed during drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{error_channel, MemoryAccumulator};
    use crate::core::config::DataType;
    use crate::core::TopicParsingConfig;
    use crate::parser::ValueParser;
    use std::time::{Duration, Instant};

    struct Fixture {
        sender: crate::queue::MessageSender,
        handle: ReceiverHandle,
        buffer: Arc<MetricBuffer>,
        errors: crate::accumulator::ErrorReceiver,
        counters: Arc<ConsumerCounters>,
    }

    fn start(buffer_size: usize, topics: TopicParserSet) -> Fixture {
        let config = ConsumerConfig::default();
        let counters = Arc::new(ConsumerCounters::default());
        let buffer = Arc::new(MetricBuffer::new(buffer_size).unwrap());
        let (error_tx, errors) = error_channel(16, Arc::clone(&counters));
        let (sender, queue) = MessageQueue::bounded(64, Arc::clone(&counters));

        let receiver = ReceiverLoop::new(
            &config,
            Box::new(ValueParser::new("sensor", "value", DataType::Integer)),
            topics,
            Arc::clone(&buffer),
            error_tx,
            Arc::clone(&counters),
        );
        assert_eq!(receiver.state(), ReceiverState::Idle);
        let handle = receiver.spawn(queue).unwrap();

        Fixture { sender, handle, buffer, errors, counters }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_messages_are_parsed_into_buffer_in_order() {
        let mut fx = start(16, TopicParserSet::default());
        assert_eq!(fx.handle.state(), ReceiverState::Running);

        for i in 1..=3 {
            assert!(fx.sender.publish("room/1", i.to_string()));
        }
        wait_for(|| fx.buffer.len() == 3);

        let values: Vec<String> = fx
            .buffer
            .drain_upto(3)
            .iter()
            .map(|e| e.metric.field("value").map(ToString::to_string).unwrap_or_default())
            .collect();
        assert_eq!(values, vec!["1", "2", "3"]);

        fx.handle.stop().unwrap();
        assert_eq!(fx.handle.state(), ReceiverState::Stopped);
    }

    #[test]
    fn test_parse_error_is_reported_and_loop_continues() {
        let mut fx = start(16, TopicParserSet::default());

        assert!(fx.sender.publish("room/1", "not-a-number"));
        assert!(fx.sender.publish("room/1", "5"));
        wait_for(|| fx.buffer.len() == 1);

        let mut acc = MemoryAccumulator::new();
        assert_eq!(fx.errors.relay(&mut acc), 1);
        let message = acc.errors()[0].to_string();
        assert!(message.contains("room/1"));
        assert!(message.contains("not-a-number"));
        assert_eq!(fx.counters.parse_errors.load(Ordering::Relaxed), 1);

        fx.handle.stop().unwrap();
    }

    #[test]
    fn test_full_buffer_drops_metrics() {
        let mut fx = start(2, TopicParserSet::default());

        for i in 0..5 {
            assert!(fx.sender.publish("t", i.to_string()));
        }
        wait_for(|| {
            fx.counters.metrics_buffered.load(Ordering::Relaxed)
                + fx.counters.metrics_dropped.load(Ordering::Relaxed)
                == 5
        });

        assert_eq!(fx.buffer.len(), 2);
        assert_eq!(fx.counters.metrics_dropped.load(Ordering::Relaxed), 3);
        let first: Vec<String> = fx.buffer.drain_upto(2).iter().map(|e| e.metric.to_string()).collect();
        assert!(first[0].contains("value=0"));
        assert!(first[1].contains("value=1"));

        fx.handle.stop().unwrap();
    }

    #[test]
    fn test_topic_parsing_failure_discards_message() {
        let config = TopicParsingConfig {
            topic: "sensors/+".to_string(),
            measurement: "_/measurement".to_string(),
            fields: "_/reading".to_string(),
            field_types: [("reading".to_string(), crate::core::config::FieldType::Int)]
                .into_iter()
                .collect(),
            ..TopicParsingConfig::default()
        };
        let topics = TopicParserSet::compile(&[config]).unwrap();
        let mut fx = start(16, topics);

        assert!(fx.sender.publish("sensors/abc", "1"));
        assert!(fx.sender.publish("sensors/42", "2"));
        wait_for(|| fx.buffer.len() == 1);

        let entries = fx.buffer.drain_upto(1);
        assert_eq!(entries[0].metric.name(), "42");
        assert_eq!(entries[0].metric.field("reading"), Some(&crate::core::FieldValue::Int(42)));

        let mut acc = MemoryAccumulator::new();
        assert_eq!(fx.errors.relay(&mut acc), 1);

        fx.handle.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent_and_discards_late_messages() {
        let mut fx = start(16, TopicParserSet::default());
        fx.handle.stop().unwrap();
        fx.handle.stop().unwrap();
        assert_eq!(fx.handle.state(), ReceiverState::Stopped);

        fx.sender.publish("t", "1");
        std::thread::sleep(Duration::from_millis(20));
        assert!(fx.buffer.is_empty());
    }

    #[test]
    fn test_stop_after_loop_exited_keeps_stopped() {
        let Fixture { sender, mut handle, .. } = start(16, TopicParserSet::default());

        drop(sender);
        wait_for(|| handle.state() == ReceiverState::Stopped);

        handle.stop().unwrap();
        assert_eq!(handle.state(), ReceiverState::Stopped);
    }
}
