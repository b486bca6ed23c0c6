//! Topic filters and topic parsing.
//!
//! Topics are `/`-separated. In a filter, `+` matches exactly one level and
//! `#` matches a run of zero or more levels; unlike plain MQTT, `#` may sit
//! anywhere, but only once. Parsing patterns line up with the topic the
//! same way: segments before `#` align with the start of the topic,
//! segments after it with the end. `_` (or an empty segment) skips a level.

use crate::core::config::{FieldType, TopicParsingConfig};
use crate::core::{FieldValue, KeruuError, Metric, Result};
use crate::parser::parse_bool;
use std::collections::BTreeMap;

const SEPARATOR: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Check if a topic matches a subscription filter
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let filter: Vec<&str> = filter.split(SEPARATOR).collect();
    let topic: Vec<&str> = topic.split(SEPARATOR).collect();
    let level_matches = |f: &&str, t: &&str| *f == SINGLE_LEVEL || f == t;

    match filter.iter().position(|s| *s == MULTI_LEVEL) {
        None => {
            filter.len() == topic.len()
                && filter.iter().zip(topic.iter()).all(|(f, t)| level_matches(f, t))
        },
        Some(hash) => {
            let (prefix, suffix) = (&filter[..hash], &filter[hash + 1..]);
            if topic.len() < prefix.len() + suffix.len() {
                return false;
            }
            let tail = &topic[topic.len() - suffix.len()..];
            prefix.iter().zip(topic.iter()).all(|(f, t)| level_matches(f, t))
                && suffix.iter().zip(tail.iter()).all(|(f, t)| level_matches(f, t))
        },
    }
}

/// One compiled pattern: named positions before and after an optional `#`
#[derive(Debug, Clone, PartialEq)]
struct SegmentPattern {
    head: Vec<Option<String>>,
    /// `Some` when the pattern contains `#`
    tail: Option<Vec<Option<String>>>,
}

impl SegmentPattern {
    fn compile(part: &str, pattern: &str, filter_len: usize, filter_has_hash: bool) -> Result<Self> {
        let segments: Vec<&str> = pattern.split(SEPARATOR).collect();
        let name = |s: &&str| match *s {
            "" | "_" => None,
            other => Some(other.to_string()),
        };

        match segments.iter().filter(|s| **s == MULTI_LEVEL).count() {
            0 => {
                if !filter_has_hash && segments.len() != filter_len {
                    return Err(KeruuError::topic_parsing(format!(
                        "config error topic parsing: {} length does not equal topic length",
                        part
                    )));
                }
                Ok(Self {
                    head: segments.iter().map(name).collect(),
                    tail: None,
                })
            },
            1 => {
                let hash = segments.iter().position(|s| *s == MULTI_LEVEL).unwrap_or(0);
                Ok(Self {
                    head: segments[..hash].iter().map(name).collect(),
                    tail: Some(segments[hash + 1..].iter().map(name).collect()),
                })
            },
            _ => Err(KeruuError::topic_parsing(format!(
                "config error topic parsing: {} may contain at most one '#'",
                part
            ))),
        }
    }

    fn named(&self) -> impl Iterator<Item = &str> {
        self.head
            .iter()
            .chain(self.tail.iter().flatten())
            .filter_map(|s| s.as_deref())
    }

    /// Pair named positions with topic levels; `None` if the topic does not fit
    fn resolve<'t>(&self, levels: &[&'t str]) -> Option<Vec<(&str, &'t str)>> {
        let mut pairs = Vec::new();
        match &self.tail {
            None => {
                if self.head.len() != levels.len() {
                    return None;
                }
                collect_named(&self.head, levels, &mut pairs);
            },
            Some(tail) => {
                if self.head.len() + tail.len() > levels.len() {
                    return None;
                }
                collect_named(&self.head, levels, &mut pairs);
                collect_named(tail, &levels[levels.len() - tail.len()..], &mut pairs);
            },
        }
        Some(pairs)
    }
}

fn collect_named<'p, 't>(
    names: &'p [Option<String>],
    levels: &[&'t str],
    out: &mut Vec<(&'p str, &'t str)>,
) {
    for (name, level) in names.iter().zip(levels.iter()) {
        if let Some(name) = name {
            out.push((name.as_str(), *level));
        }
    }
}

/// An absent pattern fits every topic and names nothing
fn resolve_optional<'p, 't>(
    pattern: &'p Option<SegmentPattern>,
    levels: &[&'t str],
) -> Option<Vec<(&'p str, &'t str)>> {
    match pattern {
        None => Some(Vec::new()),
        Some(p) => p.resolve(levels),
    }
}

/// Compiled form of a [`TopicParsingConfig`]
#[derive(Debug, Clone)]
pub struct TopicParser {
    filter: String,
    measurement: Option<SegmentPattern>,
    tags: Option<SegmentPattern>,
    fields: Option<SegmentPattern>,
    field_types: BTreeMap<String, FieldType>,
}

impl TopicParser {
    /// Compile a rule, validating its patterns against the topic filter
    pub fn new(config: &TopicParsingConfig) -> Result<Self> {
        if config.topic.is_empty() {
            return Err(KeruuError::topic_parsing("config error topic parsing: topic cannot be empty"));
        }

        let filter_levels: Vec<&str> = config.topic.split(SEPARATOR).collect();
        let hashes = filter_levels.iter().filter(|s| **s == MULTI_LEVEL).count();
        if hashes > 1 {
            return Err(KeruuError::topic_parsing(
                "config error topic parsing: topic may contain at most one '#'",
            ));
        }

        let compile = |part: &str, pattern: &str| -> Result<Option<SegmentPattern>> {
            if pattern.is_empty() {
                return Ok(None);
            }
            SegmentPattern::compile(part, pattern, filter_levels.len(), hashes == 1).map(Some)
        };

        let measurement = compile("measurement", &config.measurement)?;
        if let Some(pattern) = &measurement {
            if pattern.named().count() != 1 {
                return Err(KeruuError::topic_parsing(
                    "config error topic parsing: measurement pattern must name exactly one segment",
                ));
            }
        }

        Ok(Self {
            filter: config.topic.clone(),
            measurement,
            tags: compile("tags", &config.tags)?,
            fields: compile("fields", &config.fields)?,
            field_types: config.field_types.clone(),
        })
    }

    /// Topic filter of this rule
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Apply the rule to a metric that arrived on `topic`.
    ///
    /// Metrics from topics that do not match the filter, or whose level
    /// count does not fit every pattern, are returned unchanged.
    pub fn apply(&self, topic: &str, metric: Metric) -> Result<Metric> {
        if !topic_matches(&self.filter, topic) {
            return Ok(metric);
        }

        let levels: Vec<&str> = topic.split(SEPARATOR).collect();
        let (Some(measurement), Some(tags), Some(fields)) = (
            resolve_optional(&self.measurement, &levels),
            resolve_optional(&self.tags, &levels),
            resolve_optional(&self.fields, &levels),
        ) else {
            tracing::debug!(topic = %topic, filter = %self.filter, "topic does not fit parsing patterns");
            return Ok(metric);
        };

        let mut metric = metric;
        if let Some((_, name)) = measurement.first() {
            metric = metric.with_name(*name);
        }
        for (key, value) in tags {
            metric = metric.with_tag(key, value);
        }
        for (key, value) in fields {
            let converted = self.convert_field(key, value)?;
            metric = metric.with_field(key, converted);
        }
        Ok(metric)
    }

    fn convert_field(&self, key: &str, value: &str) -> Result<FieldValue> {
        let target = self.field_types.get(key).copied().unwrap_or(FieldType::String);
        let converted = match target {
            FieldType::Int => value.parse::<i64>().ok().map(FieldValue::Int),
            FieldType::Uint => value.parse::<u64>().ok().map(FieldValue::Uint),
            FieldType::Float => value.parse::<f64>().ok().map(FieldValue::Float),
            FieldType::Bool => parse_bool(value).map(FieldValue::Bool),
            FieldType::String => Some(FieldValue::String(value.to_string())),
        };
        converted.ok_or_else(|| KeruuError::FieldConversion {
            field: key.to_string(),
            target: target.as_str(),
            value: value.to_string(),
        })
    }
}

/// Ordered collection of topic parsing rules
#[derive(Debug, Clone, Default)]
pub struct TopicParserSet {
    parsers: Vec<TopicParser>,
}

impl TopicParserSet {
    /// Compile every configured rule
    pub fn compile(configs: &[TopicParsingConfig]) -> Result<Self> {
        let parsers = configs.iter().map(TopicParser::new).collect::<Result<Vec<_>>>()?;
        Ok(Self { parsers })
    }

    /// Apply all matching rules in configuration order
    pub fn apply(&self, topic: &str, metric: Metric) -> Result<Metric> {
        self.parsers
            .iter()
            .try_fold(metric, |metric, parser| parser.apply(topic, metric))
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Check if no rules are configured
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
