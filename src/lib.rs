//! Keruu - buffered, backpressure-aware metric consumer.
//!
//! Keruu takes raw messages from a publish/subscribe transport, parses them
//! into metrics on a dedicated receiver thread and holds them in a bounded
//! buffer until a periodic gather cycle hands them to an accumulator.
//!
//! # Features
//!
//! - **Non-blocking ingestion**: transport callbacks never wait on parsing
//! - **Bounded memory**: full queues and buffers drop new data and count it
//! - **Topic routing**: originating topic recorded as a tag, topic parsing rules
//! - **Bounded gather**: a cycle only delivers what was buffered when it began
//!
//! # Architecture
//!
//! - `queue`: bounded queue between transport and receiver loop
//! - `receiver`: receiver loop and topic parsing
//! - `buffer`: lock-free bounded metric buffer
//! - `consumer`: lifecycle and the gather cycle
//! - `accumulator`: downstream sinks
//! - `transport`: message sources
//! - `parser`: payload parsers
//! - `core`: domain models, configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use keruu_lib::accumulator::MemoryAccumulator;
//! use keruu_lib::consumer::Consumer;
//! use keruu_lib::core::Config;
//! use keruu_lib::parser;
//! use keruu_lib::transport::ReaderTransport;
//!
//! fn main() -> keruu_lib::Result<()> {
//!     let config = Config::new()?;
//!     let parser = parser::from_config(&config.parser)?;
//!     let transport = Box::new(ReaderTransport::stdin());
//!
//!     let mut consumer = Consumer::new(config.consumer, parser, transport)?;
//!     consumer.start()?;
//!
//!     let mut acc = MemoryAccumulator::new();
//!     consumer.gather(&mut acc)?;
//!     consumer.stop()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod accumulator;
pub mod buffer;
pub mod cli;
pub mod consumer;
pub mod core;
pub mod monitoring;
pub mod parser;
pub mod queue;
pub mod receiver;
pub mod transport;

// Re-export core types for convenience
pub use crate::core::{Config, KeruuError, Metric, Result};
