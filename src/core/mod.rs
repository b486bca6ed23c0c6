//! Core domain models for Keruu.
//!
//! This module contains the metric data model, configuration and error
//! types shared by every stage of the delivery pipeline.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, ConsumerConfig, TopicParsingConfig};
pub use error::{KeruuError, Result};
pub use types::{FieldSet, FieldValue, Metric, MetricBuilder, TagSet};
