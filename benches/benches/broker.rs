use std::{hint::black_box, sync::Arc};

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use spacestore::engine::{subject_matches, BrokerEngine, ConnectionSink, DeliveryOptions};

/// Приёмник, который принимает любую доставку и ничего не хранит.
struct NullSink;

impl ConnectionSink for NullSink {
    fn is_connection_healthy(
        &self,
        _connection_id: &str,
    ) -> bool {
        true
    }

    fn send_to_connection(
        &self,
        _connection_id: &str,
        _subject: &str,
        payloads: &[Bytes],
    ) -> usize {
        payloads.len()
    }
}

fn broker_with(subscribers: usize) -> BrokerEngine {
    let broker = BrokerEngine::new(Arc::new(NullSink), DeliveryOptions::immediate());
    for i in 0..subscribers {
        broker.subscribe("orders.created", &format!("c{i}")).unwrap();
    }
    broker
}

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("broker_publish");
    let payload = Bytes::from_static(b"x");
    for subs in [0usize, 1, 10, 100] {
        let broker = broker_with(subs);
        group.bench_with_input(BenchmarkId::from_parameter(subs), &subs, |b, _| {
            b.iter(|| {
                black_box(
                    broker
                        .publish("orders.created", payload.clone())
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

fn bench_publish_queue_group(c: &mut Criterion) {
    let broker = BrokerEngine::new(Arc::new(NullSink), DeliveryOptions::immediate());
    for i in 0..10 {
        broker
            .subscribe_queue("jobs", "workers", &format!("w{i}"))
            .unwrap();
    }
    let payload = Bytes::from_static(b"job");
    c.bench_function("broker_publish_queue_10", |b| {
        b.iter(|| black_box(broker.publish("jobs", payload.clone()).unwrap()))
    });
}

/// Публикация при наличии шаблонов: каждый шаблон сверяется с темой.
fn bench_publish_wildcards(c: &mut Criterion) {
    let broker = broker_with(10);
    for i in 0..50 {
        broker
            .subscribe(&format!("tenant{i}.*.created"), "w")
            .unwrap();
    }
    broker.subscribe("orders.>", "all").unwrap();
    let payload = Bytes::from_static(b"x");
    c.bench_function("broker_publish_wildcards", |b| {
        b.iter(|| black_box(broker.publish("orders.created", payload.clone()).unwrap()))
    });
}

fn bench_subject_matches(c: &mut Criterion) {
    c.bench_function("subject_matches", |b| {
        b.iter(|| {
            black_box(subject_matches(
                black_box("a.*.c.>"),
                black_box("a.b.c.d.e"),
            ))
        })
    });
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let broker = BrokerEngine::new(Arc::new(NullSink), DeliveryOptions::immediate());
    c.bench_function("broker_subscribe_unsubscribe", |b| {
        b.iter(|| {
            broker.subscribe("chan", "c").unwrap();
            broker.unsubscribe("chan", "c");
        })
    });
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_publish_queue_group,
    bench_publish_wildcards,
    bench_subject_matches,
    bench_subscribe_unsubscribe
);
criterion_main!(benches);
