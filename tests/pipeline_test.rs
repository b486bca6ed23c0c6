//! End-to-end tests of the queue, receiver loop, buffer and gather cycle.

mod common;

use common::*;
use keruu_lib::accumulator::{ChannelAccumulator, MemoryAccumulator};
use keruu_lib::buffer::MetricBuffer;
use keruu_lib::core::config::{DataType, FieldType};
use keruu_lib::core::{FieldValue, TopicParsingConfig};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

#[test]
fn test_buffer_capacity_two_scenario() {
    let buffer = MetricBuffer::new(2).unwrap();
    let topic: Arc<str> = Arc::from("t");

    assert!(buffer.push(metric("a", 1), Arc::clone(&topic)));
    assert!(buffer.push(metric("b", 2), Arc::clone(&topic)));
    assert!(!buffer.push(metric("c", 3), Arc::clone(&topic)));
    assert_eq!(buffer.len(), 2);

    let names: Vec<String> = buffer.drain_upto(2).into_iter().map(|e| e.metric.name().to_string()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(buffer.len(), 0);
}

#[test]
fn test_messages_flow_to_accumulator_in_order() {
    let (mut consumer, publisher) = start_consumer(consumer_config(&["sensors/#"]));

    for i in 0..50 {
        assert!(publisher.publish("sensors/hall", i.to_string()));
    }
    wait_processed(&consumer, 50);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();

    assert_eq!(values(acc.metrics()), (0..50).collect::<Vec<_>>());
    assert!(acc.metrics().iter().all(|m| m.tag("topic") == Some("sensors/hall")));

    // Nothing is delivered twice
    let mut again = MemoryAccumulator::new();
    consumer.gather(&mut again).unwrap();
    assert!(again.metrics().is_empty());

    consumer.stop().unwrap();
}

#[test]
fn test_parse_error_does_not_stop_pipeline() {
    let (mut consumer, publisher) = start_consumer(consumer_config(&["sensors/+"]));

    assert!(publisher.publish("sensors/a", "1"));
    assert!(publisher.publish("sensors/a", "garbage"));
    assert!(publisher.publish("sensors/a", "3"));
    wait_processed(&consumer, 3);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();

    assert_eq!(values(acc.metrics()), vec![1, 3]);
    assert_eq!(acc.errors().len(), 1);
    let error = acc.errors()[0].to_string();
    assert!(error.contains("sensors/a"), "{}", error);
    assert!(error.contains("garbage"), "{}", error);
    assert_eq!(consumer.stats().parse_errors, 1);

    consumer.stop().unwrap();
}

#[test]
fn test_custom_topic_tag() {
    let config = keruu_lib::core::ConsumerConfig {
        topic_tag: "source".to_string(),
        ..consumer_config(&["#"])
    };
    let (mut consumer, publisher) = start_consumer(config);

    assert!(publisher.publish("plant/line1", "7"));
    wait_processed(&consumer, 1);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();
    let metric = &acc.metrics()[0];
    assert_eq!(metric.tag("source"), Some("plant/line1"));
    assert_eq!(metric.tag("topic"), None);

    consumer.stop().unwrap();
}

#[test]
fn test_unsubscribed_topics_never_arrive() {
    let (mut consumer, publisher) = start_consumer(consumer_config(&["sensors/+"]));

    assert!(!publisher.publish("sensors/a/b", "1"));
    assert!(!publisher.publish("other", "1"));
    assert!(publisher.publish("sensors/a", "2"));
    wait_processed(&consumer, 1);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();
    assert_eq!(values(acc.metrics()), vec![2]);

    consumer.stop().unwrap();
}

#[test]
fn test_topic_parsing_end_to_end() {
    let rule = TopicParsingConfig {
        topic: "telegraf/+/cpu/23".to_string(),
        measurement: "_/_/measurement/_".to_string(),
        tags: "testTag/_/_/_".to_string(),
        fields: "_/_/_/testNumber".to_string(),
        field_types: [("testNumber".to_string(), FieldType::Int)].into_iter().collect(),
    };
    let config = keruu_lib::core::ConsumerConfig {
        topic_parsing: vec![rule],
        ..consumer_config(&["telegraf/#"])
    };
    let (mut consumer, publisher) = start_consumer_with(config, DataType::Float);

    assert!(publisher.publish("telegraf/123/cpu/23", "42.5"));
    wait_processed(&consumer, 1);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();

    let metric = &acc.metrics()[0];
    assert_eq!(metric.name(), "cpu");
    assert_eq!(metric.tag("testTag"), Some("telegraf"));
    assert_eq!(metric.tag("topic"), Some("telegraf/123/cpu/23"));
    assert_eq!(metric.field("testNumber"), Some(&FieldValue::Int(23)));
    assert_eq!(metric.field("value"), Some(&FieldValue::Float(42.5)));

    consumer.stop().unwrap();
}

#[test]
fn test_buffer_overflow_drops_newest() {
    let config = keruu_lib::core::ConsumerConfig {
        buffer_size: 4,
        ..consumer_config(&["t"])
    };
    let (mut consumer, publisher) = start_consumer(config);

    let mut offered = 0;
    for i in 0..4 {
        if publisher.publish("t", i.to_string()) {
            offered += 1;
        }
    }
    wait_processed(&consumer, offered);
    for i in 4..8 {
        if publisher.publish("t", i.to_string()) {
            offered += 1;
        }
    }
    wait_processed(&consumer, offered);

    let stats = consumer.stats();
    assert_eq!(stats.metrics_buffered, 4);
    assert_eq!(stats.metrics_dropped, offered - 4);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();
    assert_eq!(values(acc.metrics()), vec![0, 1, 2, 3]);

    consumer.stop().unwrap();
}

#[test]
fn test_channel_accumulator_applies_global_tags() {
    let (mut consumer, publisher) = start_consumer(consumer_config(&["t"]));
    assert!(publisher.publish("t", "5"));
    wait_processed(&consumer, 1);

    let mut global = BTreeMap::new();
    global.insert("dc".to_string(), "eu-1".to_string());
    global.insert("topic".to_string(), "overridden".to_string());

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut acc = ChannelAccumulator::new(tx).with_global_tags(&global);
    consumer.gather(&mut acc).unwrap();

    let metric = rx.try_recv().unwrap();
    assert_eq!(metric.tag("dc"), Some("eu-1"));
    assert_eq!(metric.tag("topic"), Some("t"));

    consumer.stop().unwrap();
}

#[test]
fn test_concurrent_publish_and_gather() {
    const TOTAL: usize = 10_000;
    let config = keruu_lib::core::ConsumerConfig {
        buffer_size: 256,
        ..consumer_config(&["load"])
    };
    let (mut consumer, publisher) = start_consumer(config);

    let producer = std::thread::spawn(move || {
        let mut accepted = 0u64;
        for i in 0..TOTAL {
            if publisher.publish("load", i.to_string()) {
                accepted += 1;
            }
        }
        accepted
    });

    let mut gathered = Vec::new();
    while !producer.is_finished() {
        let mut acc = MemoryAccumulator::new();
        consumer.gather(&mut acc).unwrap();
        gathered.extend(values(acc.metrics()));
    }
    let accepted = producer.join().unwrap();
    wait_processed(&consumer, accepted);

    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();
    gathered.extend(values(acc.metrics()));

    let stats = consumer.stats();
    assert_eq!(stats.messages_received, accepted);
    assert_eq!(stats.messages_received + stats.messages_dropped, TOTAL as u64);
    assert_eq!(gathered.len() as u64 + stats.metrics_dropped, accepted);
    assert!(gathered.windows(2).all(|w| w[0] < w[1]), "values out of order or duplicated");

    consumer.stop().unwrap();
}

#[test]
fn test_stop_then_publish_is_discarded() {
    let (mut consumer, publisher) = start_consumer(consumer_config(&["t"]));
    consumer.stop().unwrap();

    assert!(!publisher.publish("t", "1"));
    let mut acc = MemoryAccumulator::new();
    consumer.gather(&mut acc).unwrap();
    assert!(acc.metrics().is_empty());
    assert!(acc.errors().is_empty());
}
