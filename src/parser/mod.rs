//! Payload parsers.
//!
//! A parser turns the opaque payload of one message into zero or more
//! metrics. Parsers never see the buffer; the receiver loop decides what
//! happens to their output.
//!
//! ```text
//! payload bytes ──► Parser ──► Vec<Metric>
//! ```

mod value;

pub use value::ValueParser;
pub(crate) use value::parse_bool;

use crate::core::config::{DataFormat, ParserConfig};
use crate::core::{Metric, Result};

/// Parser trait - transforms raw bytes into metrics
///
/// # Implementing a Parser
///
/// ```ignore
/// use keruu_lib::parser::Parser;
/// use keruu_lib::core::{Metric, Result};
///
/// struct CountingParser;
///
/// impl Parser for CountingParser {
///     fn name(&self) -> &'static str {
///         "counting"
///     }
///
///     fn parse(&self, payload: &[u8]) -> Result<Vec<Metric>> {
///         Ok(vec![Metric::builder("bytes").field("len", payload.len() as u64).build()?])
///     }
/// }
/// ```
pub trait Parser: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Transform a payload into metrics.
    ///
    /// # Errors
    /// `KeruuError::Parse` if the payload is malformed.
    fn parse(&self, payload: &[u8]) -> Result<Vec<Metric>>;
}

/// Build the parser described by the configuration
pub fn from_config(config: &ParserConfig) -> Result<Box<dyn Parser>> {
    match config.data_format {
        DataFormat::Value => Ok(Box::new(ValueParser::from_config(config)?)),
    }
}
