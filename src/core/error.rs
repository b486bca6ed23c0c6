use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeruuError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Failed to parse message on topic '{topic}': {reason} (payload: {payload})")]
    Message {
        topic: String,
        payload: String,
        reason: String,
    },

    #[error("Topic parsing error: {0}")]
    TopicParsing(String),

    #[error("Unable to convert field '{field}' value '{value}' to type {target}")]
    FieldConversion {
        field: String,
        target: &'static str,
        value: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Buffer full: cannot store more items")]
    BufferFull,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias for Keruu operations
pub type Result<T> = std::result::Result<T, KeruuError>;

impl KeruuError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new topic parsing error
    pub fn topic_parsing<S: Into<String>>(msg: S) -> Self {
        Self::TopicParsing(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Returns true if collection can continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Parse { .. }
            | Self::Message { .. }
            | Self::TopicParsing(_)
            | Self::FieldConversion { .. } => true,
            Self::Transport(_) => true,
            Self::ChannelSend | Self::BufferFull => true,
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Yaml(_) => "config",
            Self::Parse { .. } | Self::Message { .. } => "parse",
            Self::TopicParsing(_) | Self::FieldConversion { .. } => "topic_parsing",
            Self::Transport(_) => "transport",
            Self::Io(_) => "io",
            Self::Join(_) => "async",
            Self::ChannelSend => "channel",
            Self::BufferFull => "buffer",
            Self::InvalidState(_) => "lifecycle",
        }
    }
}
