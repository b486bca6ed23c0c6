//! Accumulator forwarding metrics to a downstream consumer over a channel.

use super::Accumulator;
use crate::core::{FieldSet, KeruuError, Metric, TagSet};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Forwards metrics over a channel after applying global tags.
///
/// NaN and infinite float fields cannot be represented downstream and are
/// removed; a metric left without fields is dropped.
pub struct ChannelAccumulator {
    tx: Sender<Metric>,
    global_tags: Vec<(String, String)>,
    errors: Arc<AtomicU64>,
}

impl ChannelAccumulator {
    /// Create an accumulator sending into `tx`
    pub fn new(tx: Sender<Metric>) -> Self {
        Self {
            tx,
            global_tags: Vec::new(),
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Tags added to every metric that does not already carry them
    pub fn with_global_tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        self.global_tags = tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self
    }

    /// Shared count of errors received
    pub fn error_count(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.errors)
    }
}

impl Accumulator for ChannelAccumulator {
    fn add_fields(
        &mut self,
        measurement: &str,
        mut fields: FieldSet,
        mut tags: TagSet,
        timestamp: DateTime<Utc>,
    ) {
        let before = fields.len();
        fields.retain(|_, v| v.is_finite());
        if fields.len() != before {
            tracing::debug!(
                measurement = %measurement,
                removed = before - fields.len(),
                "dropped non-finite float fields"
            );
        }
        if fields.is_empty() {
            tracing::debug!(measurement = %measurement, "metric has no fields, dropped");
            return;
        }

        for (key, value) in &self.global_tags {
            if !tags.contains_key(key) {
                tags.insert(key.as_str(), value.clone());
            }
        }

        let metric = match Metric::new(measurement, tags, fields, timestamp) {
            Ok(metric) => metric,
            Err(e) => {
                self.add_error(e);
                return;
            },
        };

        if self.tx.send(metric).is_err() {
            tracing::warn!(
                measurement = %measurement,
                error = %KeruuError::ChannelSend,
                "metric channel closed"
            );
        }
    }

    fn add_error(&mut self, error: KeruuError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(error = %error, category = error.category(), "Error in plugin");
    }
}
