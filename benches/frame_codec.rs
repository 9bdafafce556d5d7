//! Benchmarks for the binary frame codec.
//!
//! The codec sits on the per-tick hot path at both ends: the producer
//! encodes once per tick, the consumer decodes once per received datagram.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use scopewire::test_utils::{demo_frame, demo_protocol};
use std::hint::black_box;

fn bench_encode(c: &mut Criterion) {
    let protocol = demo_protocol();
    let mut buf = vec![0u8; protocol.frame_size()];

    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Bytes(protocol.frame_size() as u64));
    group.bench_function("populate_buffer", |b| {
        b.iter(|| {
            protocol.populate_buffer(black_box(12.5), black_box(&mut buf)).unwrap();
            black_box(&buf);
        })
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut protocol = demo_protocol();
    let frame = demo_frame(12.5, 42.0);

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("populate_channels", |b| {
        b.iter(|| {
            let timestamp = protocol.populate_channels(black_box(&frame)).unwrap();
            black_box(timestamp)
        })
    });
    group.finish();
}

fn bench_header(c: &mut Criterion) {
    let protocol = demo_protocol();
    let header = protocol.serialize_header();

    let mut group = c.benchmark_group("header");
    group.bench_function("serialize", |b| {
        b.iter(|| black_box(protocol.serialize_header()))
    });
    group.bench_function("deserialize", |b| {
        b.iter(|| scopewire::Protocol::deserialize_header(black_box(&header)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_header);
criterion_main!(benches);
