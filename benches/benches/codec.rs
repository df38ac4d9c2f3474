use std::{collections::BTreeMap, hint::black_box};

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spacestore::{
    codec::{decode, Value},
    protocol::{Command, CommandId, Message, Response},
    StatusCode,
};

fn sample_map(size: usize) -> Value {
    let map: BTreeMap<String, Value> = (0..size)
        .map(|i| (format!("field-{i}"), Value::Int64(i as i64)))
        .collect();
    Value::Map(map)
}

fn bench_value_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_encode");
    for size in [8usize, 128, 1024] {
        let value = sample_map(size);
        group.throughput(Throughput::Bytes(value.encoded_size() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, v| {
            let mut buf = Vec::with_capacity(v.encoded_size());
            b.iter(|| {
                buf.clear();
                v.encode_into(&mut buf).unwrap();
                black_box(buf.len())
            })
        });
    }
    group.finish();
}

fn bench_value_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_decode");
    for size in [8usize, 128, 1024] {
        let bytes = sample_map(size).encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, buf| {
            b.iter(|| black_box(decode(black_box(buf)).unwrap()))
        });
    }
    group.finish();
}

fn bench_command_frame(c: &mut Criterion) {
    let body = Value::Binary(Bytes::from(vec![0xAB; 512])).encode().unwrap();
    let cmd = Command::new(1, CommandId::Set)
        .with_target("bench", "kv")
        .with_body(body.to_vec());

    c.bench_function("command_encode_frame", |b| {
        let mut frame = Vec::new();
        b.iter(|| {
            cmd.encode_frame(&mut frame).unwrap();
            black_box(frame.len())
        })
    });

    let mut frame = Vec::new();
    cmd.encode_frame(&mut frame).unwrap();
    c.bench_function("command_decode_frame", |b| {
        b.iter(|| {
            let message = Message::decode(black_box(&frame[4..])).unwrap();
            black_box(Command::decode(message.payload).unwrap())
        })
    });
}

fn bench_response_frame(c: &mut Criterion) {
    let resp = Response::new(7, StatusCode::Ok, vec![0u8; 256]);
    c.bench_function("response_encode_frame", |b| {
        let mut frame = Vec::new();
        b.iter(|| {
            resp.encode_frame(&mut frame).unwrap();
            black_box(frame.len())
        })
    });
}

criterion_group!(
    benches,
    bench_value_encode,
    bench_value_decode,
    bench_command_frame,
    bench_response_frame
);
criterion_main!(benches);
