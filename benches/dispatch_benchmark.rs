//! Benchmarks for the dispatch path.
//!
//! The engine here completes every request inline, from inside `submit`, so
//! the numbers measure the bridge alone: encoding, registry bookkeeping,
//! payload decoding and waking the caller.
//!
//! Run benchmarks:
//! ```bash
//! cargo bench --bench dispatch_benchmark
//! ```

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use muxis_bridge::command::{get, set};
use muxis_bridge::proto::codec::encode_frame;
use muxis_bridge::{
    key_slot, Batch, Client, ClientBuilder, Completions, Connector, Engine, EngineError, Frame,
    Route, SlotType, Token, WirePayload, WireRequest,
};
use tokio::runtime::Runtime;

/// Replies `OK` to single commands and one `OK` per command to batches.
struct InlineEngine {
    completions: Completions,
}

struct InlineConnector;

impl Connector for InlineConnector {
    fn connect(
        &self,
        _connection_request: &[u8],
        completions: Completions,
    ) -> Result<Box<dyn Engine>, EngineError> {
        Ok(Box::new(InlineEngine { completions }))
    }
}

impl Engine for InlineEngine {
    fn submit(&self, request: WireRequest<'_>, token: Token) -> Result<(), EngineError> {
        let ok = Frame::SimpleString(b"OK".to_vec());
        let reply = match request.payload {
            WirePayload::Command(_) => ok,
            WirePayload::Batch { commands, .. } => Frame::Array(vec![ok; commands.len()]),
            _ => ok,
        };
        self.completions.on_complete(token, &encode_frame(&reply));
        Ok(())
    }

    fn close(&self) {}
}

fn create_client() -> Client {
    ClientBuilder::new()
        .address("localhost:6379")
        .max_inflight_requests(0)
        .connect(&InlineConnector)
        .unwrap()
}

/// Benchmark: SET with different value sizes.
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    let rt = Runtime::new().unwrap();
    let client = create_client();

    for size in [64, 1024, 16384].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let value = Bytes::from(vec![b'x'; size]);
            b.to_async(&rt).iter(|| async {
                client
                    .set(black_box("bench:set"), black_box(value.clone()))
                    .await
                    .unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: many requests in flight at once.
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    let rt = Runtime::new().unwrap();
    let client = create_client();

    for n in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            let cmds: Vec<_> = (0..n).map(|i| get(format!("key-{i}"))).collect();
            b.to_async(&rt).iter(|| async {
                for result in client.send_all(black_box(&cmds)).await {
                    result.unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark: pipelines of increasing length.
fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    let rt = Runtime::new().unwrap();
    let client = create_client();

    for len in [10, 100].iter() {
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            b.to_async(&rt).iter(|| async {
                let mut batch = Batch::pipeline();
                for i in 0..len {
                    batch.push(set(format!("key-{i}"), "v"));
                }
                client.exec(&mut batch).await.unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: tasks racing on one client.
fn bench_spawned(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = create_client();

    c.bench_function("spawned_100", |b| {
        b.to_async(&rt).iter(|| async {
            let tasks = (0..100).map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.get("key").await })
            });
            for task in join_all(tasks).await {
                task.unwrap().unwrap();
            }
        });
    });
}

/// Benchmark: slot calculation and route encoding.
fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");

    group.bench_function("key_slot", |b| {
        b.iter(|| key_slot(black_box(b"user:{12345}:profile")));
    });

    group.bench_function("encode_slot_key", |b| {
        let route = Route::SlotKey {
            slot_type: SlotType::Primary,
            key: "user:{12345}:profile".into(),
        };
        b.iter(|| Route::encode(black_box(Some(&route))).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_concurrent,
    bench_pipeline,
    bench_spawned,
    bench_routing
);
criterion_main!(benches);
