//! Line-oriented transport over any reader.

use super::Transport;
use crate::core::{KeruuError, Result};
use crate::queue::MessageSender;
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Reads lines on a background thread; every non-empty line is one message.
///
/// Lines are routed under a fixed topic, or the first subscribed topic if
/// none was set. The reader can only be consumed once.
pub struct ReaderTransport {
    reader: Option<Box<dyn Read + Send>>,
    topic: Option<String>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

impl ReaderTransport {
    /// Wrap a reader
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            topic: None,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Transport reading the process's standard input
    pub fn stdin() -> Self {
        Self::new(std::io::stdin())
    }

    /// Route every line under `topic`
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Wait for the reader to reach end of input; returns lines delivered
    pub fn join(&mut self) -> Result<u64> {
        match self.thread.take() {
            Some(thread) => join_reader(thread),
            None => Ok(0),
        }
    }
}

fn join_reader(thread: JoinHandle<u64>) -> Result<u64> {
    thread.join().map_err(|_| KeruuError::transport("reader thread panicked"))
}

fn read_lines(reader: Box<dyn Read + Send>, topic: &str, sink: &MessageSender, stop: &AtomicBool) -> u64 {
    let mut delivered = 0;
    for line in BufReader::new(reader).lines() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "reader transport failed, closing");
                break;
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        if sink.publish(topic, line) {
            delivered += 1;
        }
    }
    tracing::debug!(topic = %topic, delivered, "reader transport reached end of input");
    delivered
}

impl Transport for ReaderTransport {
    fn name(&self) -> &'static str {
        "reader"
    }

    fn connect(&mut self, topics: &[String], sink: MessageSender) -> Result<()> {
        let topic = self
            .topic
            .clone()
            .or_else(|| topics.first().cloned())
            .ok_or_else(|| KeruuError::transport("reader transport needs a topic"))?;
        let reader = self
            .reader
            .take()
            .ok_or_else(|| KeruuError::transport("reader already consumed"))?;

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let thread = std::thread::Builder::new()
            .name("keruu-reader".to_string())
            .spawn(move || read_lines(reader, &topic, &sink, &stop))?;
        self.thread = Some(thread);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.stop.store(true, Ordering::Release);
        // A thread blocked on an interactive reader is left to exit on its own.
        if self.thread.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(thread) = self.thread.take() {
                if let Err(e) = join_reader(thread) {
                    tracing::warn!(error = %e, "reader transport did not shut down cleanly");
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}
