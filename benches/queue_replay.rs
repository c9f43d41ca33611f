//! Queue replay benchmark suite.
//!
//! Measures the broker's hot paths against the in-memory router:
//! - Draining a backlog queued before the session opens
//! - Replaying persistent subscriptions after a lost session
//! - Tearing down many owners
//!
//! Run with: cargo bench --bench queue_replay
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::future::try_join_all;
use serde_json::json;
use tokio::runtime::Runtime;

use wamp_broker::transport::MemoryRouter;
use wamp_broker::{Broker, CommandOptions, Event, KwArgs, OwnerId};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const COMMAND_COUNTS: &[usize] = &[100, 1_000, 10_000];
const OWNER_COUNTS: &[usize] = &[10, 100];
const ENTRIES_PER_OWNER: usize = 10;

// ============================================================================
// Benchmark: Backlog Drain
// ============================================================================

fn bench_backlog_drain(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("backlog_drain");
    for &count in COMMAND_COUNTS {
        group.bench_with_input(BenchmarkId::new("publish", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| drain_backlog(count));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Persistent Replay
// ============================================================================

fn bench_persistent_replay(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("persistent_replay");
    for &count in COMMAND_COUNTS {
        group.bench_with_input(BenchmarkId::new("subscribe", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| replay_after_loss(count));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Owner Teardown
// ============================================================================

fn bench_owner_teardown(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("owner_teardown");
    for &owners in OWNER_COUNTS {
        group.bench_with_input(BenchmarkId::new("owners", owners), &owners, |b, &owners| {
            b.to_async(&rt).iter(|| teardown_owners(owners));
        });
    }
    group.finish();
}

// ============================================================================
// Helper Functions
// ============================================================================

fn broker(router: &MemoryRouter) -> Broker {
    Broker::builder()
        .connector(router.clone())
        .build()
        .expect("build broker")
}

async fn drain_backlog(count: usize) {
    let router = MemoryRouter::manual();
    let broker = broker(&router);

    let handles: Vec<_> = (0..count)
        .map(|i| {
            broker.publish(
                None,
                "com.bench.topic",
                vec![json!(i)],
                KwArgs::new(),
                CommandOptions::new(),
            )
        })
        .collect();

    router.accept();
    try_join_all(handles).await.expect("publish");
}

async fn replay_after_loss(count: usize) {
    let router = MemoryRouter::new();
    let broker = broker(&router);

    let handles: Vec<_> = (0..count)
        .map(|i| {
            broker.subscribe(
                None,
                format!("com.bench.topic{i}"),
                |_: Event| {},
                CommandOptions::persistent(),
            )
        })
        .collect();
    try_join_all(handles).await.expect("subscribe");

    router.drop_connections();
    broker.open();
    tokio::task::yield_now().await;
}

async fn teardown_owners(owners: usize) {
    let router = MemoryRouter::new();
    let broker = broker(&router);
    let ids: Vec<OwnerId> = (0..owners).map(|_| OwnerId::generate()).collect();

    let handles: Vec<_> = ids
        .iter()
        .flat_map(|owner| {
            (0..ENTRIES_PER_OWNER).map(|i| {
                broker.subscribe(
                    Some(owner.clone()),
                    format!("com.bench.topic{i}"),
                    |_: Event| {},
                    CommandOptions::new(),
                )
            })
        })
        .collect();
    try_join_all(handles).await.expect("subscribe");

    for owner in &ids {
        broker.teardown_owner(owner);
    }
}

criterion_group!(
    benches,
    bench_backlog_drain,
    bench_persistent_replay,
    bench_owner_teardown
);
criterion_main!(benches);
