//! Configuration management for Keruu.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults
//!
//! Configuration is read once before a consumer starts and is never
//! mutated afterwards.

use crate::core::{KeruuError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default capacity of the message queue and metric buffer
pub const DEFAULT_BUFFER_SIZE: usize = 100_000;

/// Default tag key used to record the originating topic
pub const DEFAULT_TOPIC_TAG: &str = "topic";

/// Complete configuration for Keruu
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Consumer configuration
    pub consumer: ConsumerConfig,
    /// Payload parser configuration
    pub parser: ParserConfig,
    /// Gather scheduling configuration
    pub gather: GatherConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Consumer (buffer, routing and topic) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Capacity of the message queue and the metric buffer
    pub buffer_size: usize,
    /// Tag key receiving the originating topic; empty disables tagging
    pub topic_tag: String,
    /// Subscription filters
    pub topics: Vec<String>,
    /// Topic parsing rules
    pub topic_parsing: Vec<TopicParsingConfig>,
    /// Minimum interval between buffer-full warnings
    #[serde(with = "humantime_serde")]
    pub drop_warning_interval: Duration,
    /// Minimum interval between parse error log lines
    #[serde(with = "humantime_serde")]
    pub parse_error_log_interval: Duration,
}

/// Rule extracting measurement, tags and fields from topic segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicParsingConfig {
    /// Topic filter this rule applies to (`+` and `#` wildcards allowed)
    pub topic: String,
    /// Pattern naming the segment holding the measurement
    pub measurement: String,
    /// Pattern naming segments that become tags
    pub tags: String,
    /// Pattern naming segments that become fields
    pub fields: String,
    /// Target types for extracted fields; unlisted fields stay strings
    pub field_types: BTreeMap<String, FieldType>,
}

/// Target type of a field extracted from a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Signed integer
    #[serde(alias = "integer")]
    Int,
    /// Unsigned integer
    Uint,
    /// Float
    Float,
    /// Boolean
    #[serde(alias = "boolean")]
    Bool,
    /// String
    String,
}

/// Payload parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Payload format
    pub data_format: DataFormat,
    /// Value type for the `value` format
    pub data_type: DataType,
    /// Measurement name of parsed metrics
    pub measurement: String,
    /// Field name of parsed values
    pub field: String,
}

/// Supported payload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// A single value per message
    Value,
}

/// Value type of a single-value payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Signed integer
    Integer,
    /// Float
    Float,
    /// Raw string
    String,
    /// Boolean
    Boolean,
    /// Integer, falling back to float, boolean, then string
    AutoInteger,
    /// Float, falling back to boolean, then string
    AutoFloat,
}

/// Gather scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatherConfig {
    /// Interval between collector cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Tags added to every gathered metric
    pub global_tags: BTreeMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            topic_tag: DEFAULT_TOPIC_TAG.to_string(),
            topics: vec!["keruu".to_string()],
            topic_parsing: Vec::new(),
            drop_warning_interval: Duration::from_secs(10),
            parse_error_log_interval: Duration::from_secs(10),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            data_format: DataFormat::Value,
            data_type: DataType::Float,
            measurement: "keruu".to_string(),
            field: "value".to_string(),
        }
    }
}

impl Default for GatherConfig {
    fn default() -> Self {
        GatherConfig {
            interval: Duration::from_secs(10),
            global_tags: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.consumer.validate()?;

        if self.parser.measurement.is_empty() {
            return Err(KeruuError::config("parser measurement cannot be empty"));
        }
        if self.parser.field.is_empty() {
            return Err(KeruuError::config("parser field cannot be empty"));
        }

        if self.gather.interval.is_zero() {
            return Err(KeruuError::config("gather interval must be greater than 0"));
        }

        Ok(())
    }
}

impl ConsumerConfig {
    /// Validate the consumer section
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(KeruuError::config("buffer_size must be greater than 0"));
        }

        if self.topics.is_empty() {
            return Err(KeruuError::config("at least one topic must be configured"));
        }

        if let Some(empty) = self.topics.iter().position(String::is_empty) {
            return Err(KeruuError::config(format!("topic #{} is empty", empty)));
        }

        crate::receiver::TopicParserSet::compile(&self.topic_parsing)?;
        Ok(())
    }

    /// Routing tag key, or `None` when topic tagging is disabled
    pub fn topic_tag_key(&self) -> Option<&str> {
        if self.topic_tag.is_empty() {
            None
        } else {
            Some(&self.topic_tag)
        }
    }
}

impl FieldType {
    /// Name used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Uint => "uint",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::String => "string",
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)?;
        Ok(self)
    }

    /// Set buffer capacity
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.consumer.buffer_size = size;
        self
    }

    /// Set the routing tag key ("" disables tagging)
    pub fn topic_tag(mut self, key: impl Into<String>) -> Self {
        self.config.consumer.topic_tag = key.into();
        self
    }

    /// Replace the subscribed topics
    pub fn topics(mut self, topics: Vec<String>) -> Self {
        self.config.consumer.topics = topics;
        self
    }

    /// Add a topic parsing rule
    pub fn topic_parsing(mut self, rule: TopicParsingConfig) -> Self {
        self.config.consumer.topic_parsing.push(rule);
        self
    }

    /// Set the gather interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.gather.interval = interval;
        self
    }

    /// Set the value data type
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.config.parser.data_type = data_type;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
