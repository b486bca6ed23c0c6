//! Consumer lifecycle and the collector (gather) cycle.
//!
//! A [`Consumer`] owns everything one plugin instance needs: its metric
//! buffer, counters, receiver loop and transport. Nothing is shared between
//! instances.

use crate::accumulator::{error_channel, Accumulator, ErrorReceiver, ERROR_CHANNEL_CAPACITY};
use crate::buffer::MetricBuffer;
use crate::core::{ConsumerConfig, KeruuError, Result};
use crate::monitoring::{ConsumerCounters, ConsumerStats};
use crate::parser::Parser;
use crate::queue::MessageQueue;
use crate::receiver::{ReceiverHandle, ReceiverLoop, ReceiverState, TopicParserSet};
use crate::transport::Transport;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Buffered, backpressure-aware metric consumer.
///
/// ```
/// use keruu_lib::accumulator::MemoryAccumulator;
/// use keruu_lib::consumer::Consumer;
/// use keruu_lib::core::ConsumerConfig;
/// use keruu_lib::parser::ValueParser;
/// use keruu_lib::transport::MemoryTransport;
/// use keruu_lib::core::config::DataType;
///
/// let (transport, publisher) = MemoryTransport::channel();
/// let parser = ValueParser::new("temp", "value", DataType::Float);
/// let config = ConsumerConfig { topics: vec!["sensors/#".into()], ..Default::default() };
///
/// let mut consumer = Consumer::new(config, Box::new(parser), Box::new(transport)).unwrap();
/// consumer.start().unwrap();
/// publisher.publish("sensors/kitchen", "21.5");
///
/// let mut acc = MemoryAccumulator::new();
/// consumer.gather(&mut acc).unwrap();
/// consumer.stop().unwrap();
/// ```
pub struct Consumer {
    config: ConsumerConfig,
    buffer: Arc<MetricBuffer>,
    counters: Arc<ConsumerCounters>,
    errors: ErrorReceiver,
    transport: Box<dyn Transport>,
    pending: Option<ReceiverLoop>,
    receiver: Option<ReceiverHandle>,
}

impl Consumer {
    /// Validate configuration and build the consumer; nothing runs yet
    pub fn new(
        config: ConsumerConfig,
        parser: Box<dyn Parser>,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let topics = TopicParserSet::compile(&config.topic_parsing)?;
        let buffer = Arc::new(MetricBuffer::new(config.buffer_size)?);
        let counters = Arc::new(ConsumerCounters::default());
        let (error_tx, errors) = error_channel(ERROR_CHANNEL_CAPACITY, Arc::clone(&counters));

        let pending = ReceiverLoop::new(
            &config,
            parser,
            topics,
            Arc::clone(&buffer),
            error_tx,
            Arc::clone(&counters),
        );

        Ok(Self {
            config,
            buffer,
            counters,
            errors,
            transport,
            pending: Some(pending),
            receiver: None,
        })
    }

    /// Start the receiver loop, then connect the transport.
    ///
    /// A consumer can be started once. If connecting fails the loop is
    /// stopped again and the transport error returned.
    pub fn start(&mut self) -> Result<()> {
        let receiver = self
            .pending
            .take()
            .ok_or_else(|| KeruuError::invalid_state("consumer already started"))?;

        let (sink, queue) = MessageQueue::bounded(self.config.buffer_size, Arc::clone(&self.counters));
        let mut handle = receiver.spawn(queue)?;

        if let Err(e) = self.transport.connect(&self.config.topics, sink) {
            tracing::error!(transport = self.transport.name(), error = %e, "transport connect failed");
            handle.stop()?;
            return Err(e);
        }

        tracing::info!(
            transport = self.transport.name(),
            topics = ?self.config.topics,
            buffer_size = self.config.buffer_size,
            "consumer started"
        );
        self.receiver = Some(handle);
        Ok(())
    }

    /// Relay receiver errors, then drain what is buffered into `acc`.
    ///
    /// Only metrics present when the cycle starts are delivered; anything
    /// pushed meanwhile waits for the next cycle. Never blocks.
    pub fn gather(&self, acc: &mut dyn Accumulator) -> Result<()> {
        let relayed = self.errors.relay(acc);

        let n = self.buffer.len();
        let entries = self.buffer.drain_upto(n);
        let delivered = entries.len();
        let topic_key = self.config.topic_tag_key();

        for entry in entries {
            let metric = match topic_key {
                Some(key) => entry.metric.with_tag(key, &*entry.topic),
                None => entry.metric,
            };
            acc.add_metric(metric);
        }

        self.counters
            .metrics_gathered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        ConsumerCounters::incr(&self.counters.gather_cycles);
        tracing::trace!(delivered, relayed, "gather cycle complete");
        Ok(())
    }

    /// Stop the receiver loop, then disconnect the transport. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut receiver) = self.receiver.take() else {
            return Ok(());
        };

        let stopped = receiver.stop();
        self.transport.disconnect();
        tracing::info!(transport = self.transport.name(), "consumer stopped");
        stopped
    }

    /// State of the receiver loop
    pub fn state(&self) -> ReceiverState {
        match (&self.pending, &self.receiver) {
            (Some(_), _) => ReceiverState::Idle,
            (None, Some(handle)) => handle.state(),
            (None, None) => ReceiverState::Stopped,
        }
    }

    /// Snapshot of the consumer's counters
    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot(self.buffer.len(), self.buffer.capacity())
    }

    /// Configuration the consumer was built with
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "consumer stop failed during drop");
        }
    }
}
