#![doc = include_str!("../README.md")]

mod backend;
mod config;
mod telemetry;

use backend::Backend;
use clap::Parser;
use config::{CliArgs, SimConfig};
use core::time::Duration;
use futures::future::join_all;
use telemetry::init_telemetry;
use tokio::{signal, time::Instant};
use transparent_herd::{Error, Herd};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = SimConfig::try_from(args)?;

    init_telemetry()?;
    tracing::info!("Starting simulation with {config:#?}");

    tokio::select! {
        report = run(config) => report?.log(),
        () = shutdown_signal() => {
            tracing::info!("Simulation interrupted");
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Report {
    elapsed: Duration,
    latencies: Vec<Duration>,
    ok: usize,
    upstream_failures: usize,
    element_failures: usize,
    other_failures: usize,
    stats: transparent_herd::StatsSnapshot,
}

async fn run(config: SimConfig) -> anyhow::Result<Report> {
    let backend = Backend::new(
        config.base_latency,
        config.per_item_latency,
        config.fail_every,
    );
    let herd = Herd::with_config(backend, config.herd)?;

    let start = Instant::now();
    let mut pending = Vec::with_capacity(config.calls);
    for key in 0..config.calls as u64 {
        let call = herd.call(key);
        pending.push(tokio::spawn(async move {
            let submitted = Instant::now();
            let outcome = call.await;
            (submitted.elapsed(), outcome)
        }));
        if let Some(interval) = config.submit_interval {
            tokio::time::sleep(interval).await;
        }
    }

    let mut report = Report::default();
    for joined in join_all(pending).await {
        let (latency, outcome) = joined?;
        report.latencies.push(latency);
        match outcome {
            Ok(_) => report.ok += 1,
            Err(Error::Upstream(_)) => report.upstream_failures += 1,
            Err(Error::Element(_)) => report.element_failures += 1,
            Err(e) => {
                tracing::error!("Call failed: {e}");
                report.other_failures += 1;
            }
        }
    }
    herd.idle().await;

    report.elapsed = start.elapsed();
    report.stats = herd.stats();
    report.latencies.sort_unstable();
    Ok(report)
}

impl Report {
    fn log(&self) {
        let calls = self.latencies.len();
        let throughput = calls as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON);

        tracing::info!(
            "{calls} calls in {:?} ({throughput:.0} calls/s)",
            self.elapsed
        );
        tracing::info!(
            "Latency p50 {:?}, p99 {:?}, max {:?}",
            percentile(&self.latencies, 0.50),
            percentile(&self.latencies, 0.99),
            self.latencies.last().copied().unwrap_or_default(),
        );
        tracing::info!(
            "{} ok, {} failed with their batch, {} failed alone, {} otherwise",
            self.ok,
            self.upstream_failures,
            self.element_failures,
            self.other_failures
        );
        tracing::info!(
            "{} batches (mean size {:.1}, {} rejected), {} mitoses, {} apoptoses",
            self.stats.batches,
            self.stats.mean_batch_size(),
            self.stats.rejected_batches,
            self.stats.mitoses,
            self.stats.apoptoses
        );
    }
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
