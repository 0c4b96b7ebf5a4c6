//! Queue and routing benchmarks
//!
//! Measures shard routing, flow hashing, and push/pop through a sharded
//! queue.
//!
//! Run with: cargo bench --bench queue_bench

use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pcapflow_core::packet::IPPROTO_TCP;
use pcapflow_core::queue::{Dequeued, QueueSet, RecyclePool, ShardRouter};
use pcapflow_core::{DispatchPolicy, FlowKey, Packet};

fn flow(host: u8, port: u16) -> FlowKey {
    FlowKey::new(
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, host)),
        port,
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        443,
        IPPROTO_TCP,
    )
}

// Routing Benchmarks

/// Benchmark flow key hashing
fn bench_flow_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow_hash");
    group.throughput(Throughput::Elements(1));

    let key = flow(7, 50_000);
    group.bench_function("ipv4", |b| {
        b.iter(|| black_box(black_box(&key).flow_hash()))
    });

    group.finish();
}

/// Benchmark shard selection per policy
fn bench_router(c: &mut Criterion) {
    let mut group = c.benchmark_group("router");
    group.throughput(Throughput::Elements(1));

    let hash = flow(7, 50_000).flow_hash();
    for shards in [2, 4, 8, 16] {
        let flow_router = ShardRouter::new(DispatchPolicy::FlowAffine, shards);
        group.bench_with_input(
            BenchmarkId::new("flow", shards),
            &flow_router,
            |b, router| b.iter(|| black_box(router.route(black_box(Some(hash))))),
        );

        let rr_router = ShardRouter::new(DispatchPolicy::RoundRobin, shards);
        group.bench_with_input(
            BenchmarkId::new("round_robin", shards),
            &rr_router,
            |b, router| b.iter(|| black_box(router.route(None))),
        );
    }

    group.finish();
}

// Queue Benchmarks

/// Benchmark push+pop through one shard of a flow-affine queue
fn bench_queue_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_roundtrip");
    group.throughput(Throughput::Elements(1));

    for shards in [1, 4] {
        let mut set: QueueSet<Packet> = QueueSet::new(Some(1024));
        let Ok(handle) = set.create("bench", DispatchPolicy::FlowAffine, shards) else {
            continue;
        };
        let producer = handle.producer();
        let consumers: Vec<_> = (0..shards)
            .filter_map(|shard| handle.consumer(shard).ok())
            .collect();

        group.bench_function(BenchmarkId::new("push_pop", shards), |b| {
            let mut port = 0u16;
            b.iter(|| {
                let mut packet = Packet::with_capacity(64);
                packet.flow = Some(flow(1, port));
                port = port.wrapping_add(1);
                let _ = producer.push(packet);
                for consumer in &consumers {
                    if let Some(Dequeued::Item(p)) = consumer.try_pop() {
                        black_box(p);
                    }
                }
            });
        });
    }

    group.finish();
}

/// Benchmark buffer acquire/release on the packet pool
fn bench_recycle_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("recycle_pool");
    group.throughput(Throughput::Elements(1));

    for capacity in [16, 1024] {
        let pool = RecyclePool::new(capacity);
        group.bench_with_input(
            BenchmarkId::new("acquire_release", capacity),
            &pool,
            |b, pool| {
                b.iter(|| {
                    if let Some(packet) = pool.acquire() {
                        pool.release(black_box(packet));
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_flow_hash,
    bench_router,
    bench_queue_roundtrip,
    bench_recycle_pool,
);
criterion_main!(benches);
