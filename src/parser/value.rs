//! Single-value payload parser.

use super::Parser;
use crate::core::config::{DataType, ParserConfig};
use crate::core::{FieldValue, KeruuError, Metric, Result};

/// Parses payloads that carry one value, e.g. `23.5` or `on`.
///
/// Surrounding whitespace and NUL padding are ignored. Except for the
/// `string` type, only the last whitespace-separated token is used.
#[derive(Debug, Clone)]
pub struct ValueParser {
    measurement: String,
    field: String,
    data_type: DataType,
}

impl ValueParser {
    /// Create a parser
    pub fn new(measurement: impl Into<String>, field: impl Into<String>, data_type: DataType) -> Self {
        Self {
            measurement: measurement.into(),
            field: field.into(),
            data_type,
        }
    }

    /// Create a parser from configuration
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        if config.measurement.is_empty() {
            return Err(KeruuError::config("parser measurement cannot be empty"));
        }
        if config.field.is_empty() {
            return Err(KeruuError::config("parser field cannot be empty"));
        }
        Ok(Self::new(&config.measurement, &config.field, config.data_type))
    }

    fn convert(&self, raw: &str) -> Result<FieldValue> {
        match self.data_type {
            DataType::Integer => raw
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|e| KeruuError::parse(format!("invalid integer {:?}: {}", raw, e))),
            DataType::Float => raw
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| KeruuError::parse(format!("invalid float {:?}: {}", raw, e))),
            DataType::Boolean => parse_bool(raw)
                .map(FieldValue::Bool)
                .ok_or_else(|| KeruuError::parse(format!("invalid boolean {:?}", raw))),
            DataType::String => Ok(FieldValue::String(raw.to_string())),
            DataType::AutoInteger => Ok(raw
                .parse::<i64>()
                .map(FieldValue::Int)
                .or_else(|_| raw.parse::<f64>().map(FieldValue::Float))
                .unwrap_or_else(|_| auto_fallback(raw))),
            DataType::AutoFloat => Ok(raw
                .parse::<f64>()
                .map(FieldValue::Float)
                .unwrap_or_else(|_| auto_fallback(raw))),
        }
    }
}

fn auto_fallback(raw: &str) -> FieldValue {
    match parse_bool(raw) {
        Some(b) => FieldValue::Bool(b),
        None => FieldValue::String(raw.to_string()),
    }
}

/// Boolean spellings accepted in payloads and topic segments
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl Parser for ValueParser {
    fn name(&self) -> &'static str {
        "value"
    }

    fn parse(&self, payload: &[u8]) -> Result<Vec<Metric>> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| KeruuError::parse(format!("payload is not valid UTF-8: {}", e)))?;
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        let raw = match self.data_type {
            DataType::String => text,
            _ => match text.split_whitespace().last() {
                Some(token) => token,
                None => return Ok(Vec::new()),
            },
        };
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let value = self.convert(raw)?;
        let metric = Metric::builder(&self.measurement).field(&self.field, value).build()?;
        Ok(vec![metric])
    }
}
