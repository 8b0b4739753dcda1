//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, Frame};

fn announce(body_len: usize) -> Frame {
    Frame::Announce {
        identity: "alice".into(),
        timestamp: "12:00:00".into(),
        body: "x".repeat(body_len),
    }
}

fn bench_encode(c: &mut Criterion) {
    let frame = announce(64);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("msgpack_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.bench_function("json_64B", |b| {
        b.iter(|| codec::encode_text(black_box(&frame)))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let frame = announce(64);
    let encoded = codec::encode(&frame).unwrap();
    let text = codec::encode_text(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("msgpack_64B", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.bench_function("json_64B", |b| {
        b.iter(|| codec::decode_text(black_box(&text)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
