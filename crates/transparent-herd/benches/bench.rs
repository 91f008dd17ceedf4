use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::{join_all, ready};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use transparent_herd::{Config, Herd};

// Number of calls submitted per benchmark iteration.
const TOTAL_CALLS: usize = 4096;

fn runtime() -> Runtime {
    Builder::new_multi_thread().enable_all().build().unwrap()
}

/// Submits `TOTAL_CALLS` calls at once against an operation that answers
/// immediately, so the measurement is dominated by the controller itself.
fn bench_instant_backend(c: &mut Criterion, group_name: &str, config: Config) {
    let runtime = runtime();
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_CALLS as u64));

    group.bench_function(format!("elems/{TOTAL_CALLS}"), |b| {
        b.to_async(&runtime).iter(|| async {
            let herd = Herd::with_config(
                |args: Vec<u64>| async move {
                    Ok::<_, String>(
                        args.into_iter()
                            .map(|n| ready(Ok::<_, String>(n + 1)))
                            .collect::<Vec<_>>(),
                    )
                },
                config,
            )
            .unwrap();

            let calls: Vec<_> = (0..TOTAL_CALLS as u64).map(|n| herd.call(n)).collect();
            for result in join_all(calls).await {
                black_box(result.unwrap());
            }
        });
    });
    group.finish();
}

/// Same, against an operation with a fixed round-trip latency, where the
/// number of concurrent batches matters.
fn bench_slow_backend(c: &mut Criterion, group_name: &str, config: Config) {
    let runtime = runtime();
    let mut group = c.benchmark_group(group_name);
    group.sample_size(10);
    group.throughput(Throughput::Elements(TOTAL_CALLS as u64));

    group.bench_function(format!("elems/{TOTAL_CALLS}"), |b| {
        b.to_async(&runtime).iter(|| async {
            let herd = Herd::with_config(
                |args: Vec<u64>| async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok::<_, String>(
                        args.into_iter()
                            .map(|n| ready(Ok::<_, String>(n + 1)))
                            .collect::<Vec<_>>(),
                    )
                },
                config,
            )
            .unwrap();

            let calls: Vec<_> = (0..TOTAL_CALLS as u64).map(|n| herd.call(n)).collect();
            for result in join_all(calls).await {
                black_box(result.unwrap());
            }
        });
    });
    group.finish();
}

fn bench_default(c: &mut Criterion) {
    bench_instant_backend(c, "herd/instant/default", Config::default());
    bench_slow_backend(c, "herd/slow/default", Config::default());
}

fn bench_capped(c: &mut Criterion) {
    let config = Config {
        min_concurrent: 1,
        max_concurrent: Some(8),
        max_batch_size: Some(64),
    };
    bench_instant_backend(c, "herd/instant/capped", config);
    bench_slow_backend(c, "herd/slow/capped", config);
}

fn bench_floor(c: &mut Criterion) {
    let config = Config {
        min_concurrent: 4,
        max_concurrent: None,
        max_batch_size: Some(256),
    };
    bench_instant_backend(c, "herd/instant/floor", config);
    bench_slow_backend(c, "herd/slow/floor", config);
}

criterion_group!(benches, bench_default, bench_capped, bench_floor);
criterion_main!(benches);
