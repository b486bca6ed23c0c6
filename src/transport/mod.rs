//! Transport connections feeding the message queue.
//!
//! A transport owns the connection to wherever messages come from. It
//! subscribes to the configured topic filters and hands each arriving message
//! to a [`MessageSender`], which never blocks the transport's own threads.

mod memory;
mod reader;

pub use memory::{MemoryPublisher, MemoryTransport};
pub use reader::ReaderTransport;

use crate::core::Result;
use crate::queue::MessageSender;

/// Source of raw messages
///
/// # Example
///
/// ```
/// use keruu_lib::core::Result;
/// use keruu_lib::queue::MessageSender;
/// use keruu_lib::transport::Transport;
///
/// struct Fixed {
///     connected: bool,
/// }
///
/// impl Transport for Fixed {
///     fn name(&self) -> &'static str {
///         "fixed"
///     }
///
///     fn connect(&mut self, topics: &[String], sink: MessageSender) -> Result<()> {
///         for topic in topics {
///             sink.publish(topic, "1");
///         }
///         self.connected = true;
///         Ok(())
///     }
///
///     fn disconnect(&mut self) {
///         self.connected = false;
///     }
///
///     fn is_connected(&self) -> bool {
///         self.connected
///     }
/// }
/// ```
pub trait Transport: Send {
    /// Transport identifier used in logs
    fn name(&self) -> &'static str;

    /// Connect and subscribe to `topics`, delivering messages into `sink`
    fn connect(&mut self, topics: &[String], sink: MessageSender) -> Result<()>;

    /// Close the connection; must be safe to call when not connected
    fn disconnect(&mut self);

    /// Check whether the transport is connected
    fn is_connected(&self) -> bool;
}
