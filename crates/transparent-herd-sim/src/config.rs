use anyhow::{Context, bail};
use clap::Parser;
use core::{num::NonZeroU64, time::Duration};
use transparent_herd::Config;

/// Runtime configuration for the `transparent-herd-sim` binary.
///
/// The concurrency bounds are handed to the controller untouched; the
/// remaining options shape the simulated backend and the submission pattern.
/// All values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "transparent-herd-sim",
    version,
    about = "Observe transparent-herd coalescing calls against a simulated batched backend"
)]
pub struct CliArgs {
    /// Number of calls to submit.
    ///
    /// Environment variable: `CALLS`
    #[arg(long, env = "CALLS", default_value_t = 10_000)]
    pub calls: usize,

    /// Workers started as soon as there is work.
    ///
    /// Environment variable: `MIN_CONCURRENT`
    #[arg(long, env = "MIN_CONCURRENT", default_value_t = 1)]
    pub min_concurrent: usize,

    /// Ceiling on concurrent batches. Requires `--max-batch-size`.
    ///
    /// Environment variable: `MAX_CONCURRENT`
    #[arg(long, env = "MAX_CONCURRENT")]
    pub max_concurrent: Option<usize>,

    /// Largest number of calls sent to the backend at once.
    ///
    /// Environment variable: `MAX_BATCH_SIZE`
    #[arg(long, env = "MAX_BATCH_SIZE")]
    pub max_batch_size: Option<usize>,

    /// Fixed cost of one backend round trip, in milliseconds.
    ///
    /// Environment variable: `BASE_LATENCY_MS`
    #[arg(long, env = "BASE_LATENCY_MS", default_value_t = 20)]
    pub base_latency_ms: u64,

    /// Additional cost per call in a batch, in microseconds.
    ///
    /// Environment variable: `PER_ITEM_LATENCY_US`
    #[arg(long, env = "PER_ITEM_LATENCY_US", default_value_t = 50)]
    pub per_item_latency_us: u64,

    /// Make every N-th backend invocation fail as a whole. `0` never fails.
    ///
    /// Environment variable: `FAIL_EVERY`
    #[arg(long, env = "FAIL_EVERY", default_value_t = 0)]
    pub fail_every: u64,

    /// Pause between two submissions, in microseconds. `0` submits everything
    /// at once.
    ///
    /// Environment variable: `SUBMIT_INTERVAL_US`
    #[arg(long, env = "SUBMIT_INTERVAL_US", default_value_t = 0)]
    pub submit_interval_us: u64,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub herd: Config,
    pub calls: usize,
    pub base_latency: Duration,
    pub per_item_latency: Duration,
    pub fail_every: Option<NonZeroU64>,
    pub submit_interval: Option<Duration>,
}

impl TryFrom<CliArgs> for SimConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.calls == 0 {
            bail!("CALLS must be greater than 0");
        }

        let herd = Config {
            min_concurrent: args.min_concurrent,
            max_concurrent: args.max_concurrent,
            max_batch_size: args.max_batch_size,
        };
        herd.validate().context("invalid concurrency bounds")?;

        let submit_interval = match args.submit_interval_us {
            0 => None,
            us => Some(Duration::from_micros(us)),
        };

        Ok(Self {
            herd,
            calls: args.calls,
            base_latency: Duration::from_millis(args.base_latency_ms),
            per_item_latency: Duration::from_micros(args.per_item_latency_us),
            fail_every: NonZeroU64::new(args.fail_every),
            submit_interval,
        })
    }
}
