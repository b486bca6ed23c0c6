//! Bounded metric buffer between the receiver loop and the collector cycle.
//!
//! The buffer is the only state shared between the two execution contexts.
//! It is a lock-free bounded FIFO: pushes never block and fail when the
//! buffer is full (drop-incoming), drains never block and take at most the
//! requested number of entries.

use crate::core::{KeruuError, Metric, Result};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One buffered metric and the topic it arrived on
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    /// Parsed metric
    pub metric: Metric,
    /// Routing metadata (originating topic)
    pub topic: Arc<str>,
}

/// Statistics for buffer monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Current buffer size
    pub len: usize,
    /// Fixed capacity
    pub capacity: usize,
    /// Total entries accepted since creation
    pub total_pushed: u64,
    /// Total entries rejected because the buffer was full
    pub total_dropped: u64,
    /// Total entries handed out by drains
    pub total_drained: u64,
}

/// Lock-free bounded FIFO of [`BufferEntry`] values.
pub struct MetricBuffer {
    queue: ArrayQueue<BufferEntry>,
    pushed: AtomicU64,
    dropped: AtomicU64,
    drained: AtomicU64,
}

impl MetricBuffer {
    /// Create a buffer holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(KeruuError::config("buffer capacity must be greater than 0"));
        }

        Ok(Self {
            queue: ArrayQueue::new(capacity),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            drained: AtomicU64::new(0),
        })
    }

    /// Append a metric with its topic.
    ///
    /// Returns false, without inserting, if the buffer is at capacity.
    #[inline]
    pub fn push(&self, metric: Metric, topic: Arc<str>) -> bool {
        self.push_entry(BufferEntry { metric, topic }).is_ok()
    }

    /// Append an entry, handing it back if the buffer is full
    #[inline]
    pub fn push_entry(&self, entry: BufferEntry) -> std::result::Result<(), BufferEntry> {
        match self.queue.push(entry) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(rejected)
            },
        }
    }

    /// Remove and return at most `n` entries in FIFO order.
    ///
    /// Entries pushed while the drain runs are only taken while the count
    /// stays below `n`; callers pass a length snapshot to bound the cycle.
    pub fn drain_upto(&self, n: usize) -> Vec<BufferEntry> {
        let mut batch = Vec::with_capacity(n.min(self.queue.len()));

        for _ in 0..n {
            match self.queue.pop() {
                Some(entry) => batch.push(entry),
                None => break,
            }
        }

        self.drained.fetch_add(batch.len() as u64, Ordering::Relaxed);
        batch
    }

    /// Current number of entries (a snapshot under concurrent pushes)
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if buffer is at capacity
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Get current buffer statistics.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            len: self.len(),
            capacity: self.capacity(),
            total_pushed: self.pushed.load(Ordering::Relaxed),
            total_dropped: self.dropped.load(Ordering::Relaxed),
            total_drained: self.drained.load(Ordering::Relaxed),
        }
    }
}
