//! HOT PATH BENCHMARKS
//!
//! Push and drain on the metric buffer, and a full parse-and-push step as
//! the receiver loop performs it.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keruu_lib::buffer::MetricBuffer;
use keruu_lib::core::config::DataType;
use keruu_lib::core::Metric;
use keruu_lib::parser::{Parser, ValueParser};
use std::sync::Arc;

fn sample_metric(i: i64) -> Metric {
    Metric::builder("sensor").tag("room", "hall").field("value", i).build().unwrap()
}

/// TARGET: <100ns per push on a non-full buffer
fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_push");
    let topic: Arc<str> = Arc::from("sensors/hall");

    group.throughput(Throughput::Elements(1));
    group.bench_function("push_then_drain", |b| {
        let buffer = MetricBuffer::new(1024).unwrap();
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            if !buffer.push(black_box(sample_metric(i)), Arc::clone(&topic)) {
                black_box(buffer.drain_upto(buffer.len()));
            }
        });
    });

    group.bench_function("push_full_rejected", |b| {
        let buffer = MetricBuffer::new(1).unwrap();
        buffer.push(sample_metric(0), Arc::clone(&topic));
        b.iter(|| black_box(buffer.push(sample_metric(1), Arc::clone(&topic))));
    });

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_drain");
    let topic: Arc<str> = Arc::from("sensors/hall");

    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let buffer = MetricBuffer::new(size).unwrap();
            b.iter(|| {
                for i in 0..size {
                    buffer.push(sample_metric(i as i64), Arc::clone(&topic));
                }
                black_box(buffer.drain_upto(buffer.len()))
            });
        });
    }

    group.finish();
}

fn bench_parse_and_push(c: &mut Criterion) {
    let parser = ValueParser::new("sensor", "value", DataType::Float);
    let buffer = MetricBuffer::new(4096).unwrap();
    let topic: Arc<str> = Arc::from("sensors/hall");

    c.bench_function("parse_and_push", |b| {
        b.iter(|| {
            for metric in parser.parse(black_box(b"23.5\n")).unwrap() {
                if !buffer.push(metric, Arc::clone(&topic)) {
                    black_box(buffer.drain_upto(buffer.len()));
                }
            }
        });
    });
}

criterion_group!(benches, bench_push, bench_drain, bench_parse_and_push);
criterion_main!(benches);
