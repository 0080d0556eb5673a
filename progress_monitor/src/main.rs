use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use progress_monitor::{default_formatter, ProgressRenderer, RenderMode, Tracker, WorkItem};
use rand::Rng;
use tokio::task::JoinSet;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

utils::configurable_constants! {
    /// Log format for the diagnostics on stderr; "json" for json blobs, text otherwise.
    ///
    /// Use the environment variable `XFER_LOG_FORMAT` to set this value.
    ref LOG_FORMAT: Option<String> = None;
}

/// Default log level. Override using the `RUST_LOG` env variable.
const DEFAULT_LOG_LEVEL_CONSOLE: &str = "warn";

const TICK: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(about = "Simulates concurrent downloads and reports them line by line.")]
struct Args {
    /// Number of transfers to run.
    #[arg(long, default_value_t = 8)]
    count: usize,

    /// Largest simulated file size, in bytes.
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    max_size: u64,

    /// Per-transfer speed, in bytes per second.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    rate: u64,

    /// Probability that a transfer fails halfway.
    #[arg(long, default_value_t = 0.2)]
    failure_rate: f64,

    /// Turn progress output off.
    #[arg(long)]
    no_progress: bool,
}

struct PlannedTransfer {
    name: String,
    size: u64,
    fails: bool,
}

fn init_logging() {
    // Diagnostics go to stderr so they never interleave with progress lines on stdout.
    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_line_number(true)
        .with_file(true)
        .with_target(false);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_CONSOLE))
        .unwrap_or_default();

    let use_json = LOG_FORMAT
        .as_deref()
        .is_some_and(|format| format.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry();
    if use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).init();
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).init();
    }
}

fn plan_transfers(args: &Args) -> Vec<PlannedTransfer> {
    let mut rng = rand::rng();
    let failure_rate = args.failure_rate.clamp(0.0, 1.0);

    (0..args.count)
        .map(|i| PlannedTransfer {
            name: format!("file_{i:03}.bin"),
            size: rng.random_range(1..=args.max_size.max(1)),
            fails: rng.random_bool(failure_rate),
        })
        .collect()
}

async fn simulate_transfer(tracker: Arc<Tracker>, size: u64, rate: u64, fails: bool) {
    let chunk = (rate as f64 * TICK.as_secs_f64()).max(1.0) as u64;

    loop {
        tokio::time::sleep(TICK).await;

        if fails && tracker.value() >= size / 2 {
            tracker.mark_as_errored();
            return;
        }

        tracker.increment(chunk.min(size - tracker.value()));
        if tracker.is_done() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();
    debug!(?args, "Starting simulation.");

    let renderer = ProgressRenderer::new(RenderMode::select(args.no_progress), default_formatter());
    let transfers = plan_transfers(&args);

    renderer.set_num_trackers_expected(transfers.len());
    renderer.start()?;

    let mut tasks = JoinSet::new();
    for transfer in transfers {
        let tracker = Tracker::new(transfer.size);
        renderer.append_tracker(tracker.clone(), transfer.size, &transfer.name);
        tasks.spawn(simulate_transfer(tracker, transfer.size, args.rate, transfer.fails));
    }

    while let Some(joined) = tasks.join_next().await {
        joined?;
    }

    renderer.stop()?;
    info!(done = renderer.length_done(), total = renderer.length(), "Simulation finished.");

    Ok(())
}
