//! In-process broker used by tests and embedders.

use super::Transport;
use crate::core::{KeruuError, Result};
use crate::queue::MessageSender;
use crate::receiver::topic_matches;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Broker {
    subscriptions: Vec<String>,
    sink: Option<MessageSender>,
    connects: u64,
    disconnects: u64,
    connect_error: Option<String>,
}

/// Transport side of an in-memory broker
pub struct MemoryTransport {
    broker: Arc<Mutex<Broker>>,
}

/// Publishing side of an in-memory broker
#[derive(Clone)]
pub struct MemoryPublisher {
    broker: Arc<Mutex<Broker>>,
}

impl MemoryTransport {
    /// Create a connected pair of transport and publisher
    pub fn channel() -> (Self, MemoryPublisher) {
        let broker = Arc::new(Mutex::new(Broker::default()));
        (
            Self {
                broker: Arc::clone(&broker),
            },
            MemoryPublisher { broker },
        )
    }

    /// Create a transport whose connect always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> (Self, MemoryPublisher) {
        let (transport, publisher) = Self::channel();
        transport.broker.lock().connect_error = Some(reason.into());
        (transport, publisher)
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(&mut self, topics: &[String], sink: MessageSender) -> Result<()> {
        let mut broker = self.broker.lock();
        broker.connects += 1;
        if let Some(reason) = &broker.connect_error {
            return Err(KeruuError::transport(reason.clone()));
        }
        broker.subscriptions = topics.to_vec();
        broker.sink = Some(sink);
        tracing::debug!(topics = ?topics, "memory transport subscribed");
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut broker = self.broker.lock();
        if broker.sink.take().is_some() {
            broker.disconnects += 1;
            broker.subscriptions.clear();
        }
    }

    fn is_connected(&self) -> bool {
        self.broker.lock().sink.is_some()
    }
}

impl MemoryPublisher {
    /// Publish a message; returns true if a subscription accepted it
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let broker = self.broker.lock();
        let Some(sink) = &broker.sink else {
            return false;
        };
        if !broker.subscriptions.iter().any(|filter| topic_matches(filter, topic)) {
            return false;
        }
        sink.publish(topic, payload)
    }

    /// Check whether the transport side is connected
    pub fn is_connected(&self) -> bool {
        self.broker.lock().sink.is_some()
    }

    /// Number of connect attempts
    pub fn connect_count(&self) -> u64 {
        self.broker.lock().connects
    }

    /// Number of disconnects of a live connection
    pub fn disconnect_count(&self) -> u64 {
        self.broker.lock().disconnects
    }
}
