//! Common test utilities and fixtures.

#![allow(dead_code)]

use keruu_lib::consumer::Consumer;
use keruu_lib::core::config::DataType;
use keruu_lib::core::{ConsumerConfig, Metric};
use keruu_lib::parser::ValueParser;
use keruu_lib::transport::{MemoryPublisher, MemoryTransport};
use std::time::{Duration, Instant};

/// Consumer config subscribed to `filters`, with everything else defaulted
pub fn consumer_config(filters: &[&str]) -> ConsumerConfig {
    ConsumerConfig {
        topics: filters.iter().map(|f| (*f).to_string()).collect(),
        ..ConsumerConfig::default()
    }
}

/// Started consumer parsing integer values, plus the publisher feeding it
pub fn start_consumer(config: ConsumerConfig) -> (Consumer, MemoryPublisher) {
    start_consumer_with(config, DataType::Integer)
}

pub fn start_consumer_with(config: ConsumerConfig, data_type: DataType) -> (Consumer, MemoryPublisher) {
    let (transport, publisher) = MemoryTransport::channel();
    let parser = ValueParser::new("sensor", "value", data_type);
    let mut consumer = Consumer::new(config, Box::new(parser), Box::new(transport)).unwrap();
    consumer.start().unwrap();
    (consumer, publisher)
}

/// Poll `condition` until it holds, failing after five seconds
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Block until the receiver loop has dealt with `count` metrics
pub fn wait_processed(consumer: &Consumer, count: u64) {
    wait_until("metrics to be processed", || {
        let stats = consumer.stats();
        stats.metrics_buffered + stats.metrics_dropped + stats.parse_errors >= count
    });
}

/// Integer metric named `name` with field `value`
pub fn metric(name: &str, value: i64) -> Metric {
    Metric::builder(name).field("value", value).build().unwrap()
}

/// Integer `value` fields of `metrics`, in order
pub fn values(metrics: &[Metric]) -> Vec<i64> {
    metrics
        .iter()
        .filter_map(|m| match m.field("value") {
            Some(keruu_lib::core::FieldValue::Int(v)) => Some(*v),
            _ => None,
        })
        .collect()
}
