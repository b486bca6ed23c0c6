use super::Accumulator;
use crate::core::{FieldSet, KeruuError, Metric, TagSet};
use chrono::{DateTime, Utc};

/// Accumulator that keeps everything it receives in memory.
#[derive(Debug, Default)]
pub struct MemoryAccumulator {
    metrics: Vec<Metric>,
    errors: Vec<KeruuError>,
}

impl MemoryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn errors(&self) -> &[KeruuError] {
        &self.errors
    }

    /// Take the recorded metrics, leaving the accumulator empty
    pub fn take_metrics(&mut self) -> Vec<Metric> {
        std::mem::take(&mut self.metrics)
    }

    /// Names of recorded metrics, in arrival order
    pub fn measurement_names(&self) -> Vec<&str> {
        self.metrics.iter().map(Metric::name).collect()
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.errors.clear();
    }
}

impl Accumulator for MemoryAccumulator {
    fn add_fields(&mut self, measurement: &str, fields: FieldSet, tags: TagSet, timestamp: DateTime<Utc>) {
        match Metric::new(measurement, tags, fields, timestamp) {
            Ok(metric) => self.metrics.push(metric),
            Err(e) => self.errors.push(e),
        }
    }

    fn add_error(&mut self, error: KeruuError) {
        self.errors.push(error);
    }
}
