use std::{
    collections::BTreeMap,
    hint::black_box,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use spacestore::{codec::Value, engine::KvEngine};

const KEYS: usize = 10_000;

fn filled(n: usize) -> KvEngine {
    let kv = KvEngine::new(false);
    for i in 0..n {
        kv.set(format!("key:{i}"), Value::Int64(i as i64));
    }
    kv
}

fn bench_set(c: &mut Criterion) {
    let kv = KvEngine::new(false);
    let mut i = 0u64;
    c.bench_function("kv_set", |b| {
        b.iter(|| {
            i += 1;
            kv.set(format!("key:{}", i % KEYS as u64), Value::Uint64(i));
        })
    });
}

fn bench_get(c: &mut Criterion) {
    let kv = filled(KEYS);
    let mut rng = SmallRng::seed_from_u64(42);
    c.bench_function("kv_get_hit", |b| {
        b.iter(|| {
            let key = format!("key:{}", rng.gen_range(0..KEYS));
            black_box(kv.get(&key))
        })
    });
    c.bench_function("kv_get_miss", |b| b.iter(|| black_box(kv.get("absent"))));
}

fn bench_set_multiple(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv_set_multiple");
    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let kv = KvEngine::new(false);
            b.iter_batched(
                || {
                    (0..size)
                        .map(|i| (format!("k{i}"), Value::Int32(i as i32)))
                        .collect::<BTreeMap<_, _>>()
                },
                |items| kv.set_multiple(items, None).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Очистка истёкших записей: половина ключей уже истекла.
fn bench_purge_expired(c: &mut Criterion) {
    c.bench_function("kv_purge_expired", |b| {
        b.iter_batched(
            || {
                let now = Arc::new(AtomicI64::new(1_000));
                let clock = now.clone();
                let kv = KvEngine::with_clock(false, Arc::new(move || clock.load(Ordering::Relaxed)));
                for i in 0..KEYS {
                    let key = format!("key:{i}");
                    if i % 2 == 0 {
                        kv.set_with_ttl(key, Value::Bool(true), 2_000).unwrap();
                    } else {
                        kv.set(key, Value::Bool(true));
                    }
                }
                now.store(3_000, Ordering::Relaxed);
                kv
            },
            |kv| black_box(kv.purge_expired()),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_set_multiple,
    bench_purge_expired
);
criterion_main!(benches);
