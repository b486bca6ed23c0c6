//! Metric data model.
//!
//! A [`Metric`] is built once by a parser and is not mutated while it is
//! shared. Tag and field sets keep insertion order so downstream output is
//! deterministic; keys are unique within a set.

use crate::core::error::{KeruuError, Result};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::fmt;

/// Polymorphic field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Signed 64-bit integer
    Int(i64),
    /// Unsigned 64-bit integer
    Uint(u64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
}

impl FieldValue {
    /// Name of the variant, as used in configuration
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::Uint(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::String(_) => "string",
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Uint(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Bool(_) | FieldValue::String(_) => None,
        }
    }

    /// False only for NaN and infinite floats
    pub fn is_finite(&self) -> bool {
        match self {
            FieldValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Uint(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// Ordered key/value set with unique keys.
///
/// Most metrics carry a handful of entries, so they are stored inline.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedSet<V> {
    entries: SmallVec<[(String, V); 8]>,
}

/// Ordered tag set of a metric
pub type TagSet = OrderedSet<String>;

/// Ordered field set of a metric
pub type FieldSet = OrderedSet<FieldValue>;

impl<V> Default for OrderedSet<V> {
    fn default() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }
}

impl<V> OrderedSet<V> {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing an existing value for the same key in place.
    ///
    /// Returns the previous value if the key was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            },
        }
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove and return the value for a key, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Keep only entries for which the predicate holds
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedSet<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl<V> IntoIterator for OrderedSet<V> {
    type Item = (String, V);
    type IntoIter = smallvec::IntoIter<[(String, V); 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// One named, timestamped observation
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    tags: TagSet,
    fields: FieldSet,
    timestamp: DateTime<Utc>,
}

impl Metric {
    /// Creates a new metric after validating the name
    pub fn new(
        name: impl Into<String>,
        tags: TagSet,
        fields: FieldSet,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(KeruuError::parse("metric name cannot be empty"));
        }
        Ok(Self {
            name,
            tags,
            fields,
            timestamp,
        })
    }

    /// Start building a metric with the given measurement name
    pub fn builder(name: impl Into<String>) -> MetricBuilder {
        MetricBuilder::new(name)
    }

    /// Measurement name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in insertion order
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Fields in insertion order
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Observation time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Value of a single tag
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Value of a single field
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Replace the measurement name; empty names are ignored
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }

    /// Attach or overwrite a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value.into());
        self
    }

    /// Attach or overwrite a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value.into());
        self
    }

    /// Split into name, tags, fields and timestamp
    pub fn into_parts(self) -> (String, TagSet, FieldSet, DateTime<Utc>) {
        (self.name, self.tags, self.fields, self.timestamp)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (k, v) in self.tags.iter() {
            write!(f, ",{}={}", k, v)?;
        }
        let mut sep = ' ';
        for (k, v) in self.fields.iter() {
            write!(f, "{}{}={}", sep, k, v)?;
            sep = ',';
        }
        write!(f, " {}", self.timestamp.to_rfc3339())
    }
}

/// Builder for [`Metric`]
#[derive(Debug, Clone)]
pub struct MetricBuilder {
    name: String,
    tags: TagSet,
    fields: FieldSet,
    timestamp: Option<DateTime<Utc>>,
}

impl MetricBuilder {
    /// Create a builder for the given measurement
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: TagSet::new(),
            fields: FieldSet::new(),
            timestamp: None,
        }
    }

    /// Add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value.into());
        self
    }

    /// Add a field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value.into());
        self
    }

    /// Set the timestamp; defaults to the build time
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the metric
    pub fn build(self) -> Result<Metric> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        Metric::new(self.name, self.tags, self.fields, timestamp)
    }
}
