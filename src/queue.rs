//! Bounded queue of raw transport messages.
//!
//! Transport callbacks hold a [`MessageSender`] and hand over messages
//! without ever blocking: when the queue is full or the receiver loop has
//! gone away, the message is discarded and counted.

use crate::core::KeruuError;
use crate::monitoring::{ConsumerCounters, RateLimitedLogger};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Message as delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Originating topic
    pub topic: Arc<str>,
    /// Opaque payload
    pub payload: Bytes,
}

impl RawMessage {
    /// Create a message
    pub fn new(topic: impl Into<Arc<str>>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Producer side of the message queue; cheap to clone
#[derive(Clone)]
pub struct MessageSender {
    tx: Sender<RawMessage>,
    counters: Arc<ConsumerCounters>,
    drop_log: Arc<RateLimitedLogger>,
}

impl MessageSender {
    /// Offer a message to the queue.
    ///
    /// Returns false if it was discarded because the queue is full or closed.
    pub fn deliver(&self, message: RawMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                ConsumerCounters::incr(&self.counters.messages_received);
                true
            },
            Err(TrySendError::Full(message)) => {
                ConsumerCounters::incr(&self.counters.messages_dropped);
                self.drop_log.record("message queue full, dropping message", &KeruuError::ChannelSend);
                tracing::trace!(topic = %message.topic, "message queue full, message dropped");
                false
            },
            Err(TrySendError::Disconnected(message)) => {
                tracing::trace!(topic = %message.topic, "consumer stopped, message discarded");
                false
            },
        }
    }

    /// Convenience wrapper around [`MessageSender::deliver`]
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        self.deliver(RawMessage::new(topic, payload))
    }
}

/// Consumer side of the message queue
pub struct MessageQueue {
    rx: Receiver<RawMessage>,
    capacity: usize,
}

impl MessageQueue {
    /// Create a queue of the given capacity, returning both ends
    pub fn bounded(capacity: usize, counters: Arc<ConsumerCounters>) -> (MessageSender, MessageQueue) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            MessageSender {
                tx,
                counters,
                drop_log: Arc::new(RateLimitedLogger::warnings()),
            },
            MessageQueue { rx, capacity },
        )
    }

    /// Underlying channel, for use in `select!`
    pub fn receiver(&self) -> &Receiver<RawMessage> {
        &self.rx
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no messages are queued
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_deliver_and_receive() {
        let counters = Arc::new(ConsumerCounters::default());
        let (sender, queue) = MessageQueue::bounded(4, Arc::clone(&counters));

        assert!(sender.publish("sensors/1", "42"));
        assert_eq!(queue.len(), 1);

        let message = queue.receiver().try_recv().unwrap();
        assert_eq!(&*message.topic, "sensors/1");
        assert_eq!(message.payload, Bytes::from_static(b"42"));
        assert_eq!(counters.messages_received.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_full_queue_drops_incoming() {
        let counters = Arc::new(ConsumerCounters::default());
        let (sender, queue) = MessageQueue::bounded(2, Arc::clone(&counters));

        assert!(sender.publish("t", "1"));
        assert!(sender.publish("t", "2"));
        assert!(!sender.publish("t", "3"));

        assert_eq!(queue.len(), 2);
        assert_eq!(counters.messages_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(queue.receiver().try_recv().unwrap().payload, Bytes::from_static(b"1"));
    }

    #[test]
    fn test_closed_queue_discards_silently() {
        let counters = Arc::new(ConsumerCounters::default());
        let (sender, queue) = MessageQueue::bounded(2, Arc::clone(&counters));
        drop(queue);

        assert!(!sender.publish("t", "late"));
        assert_eq!(counters.messages_dropped.load(Ordering::Relaxed), 0);
        assert_eq!(counters.messages_received.load(Ordering::Relaxed), 0);
    }
}
