//! Cadence daemon entry point.
//!
//! Drives a tick dispatcher on the system clock from the main thread, with
//! signal-driven shutdown and reload, periodic status logging, and an
//! optional JSON summary on exit.

mod signals;

use anyhow::{Context, Result};
use cadence_common::config::{CadenceConfig, SleepBackend};
use cadence_common::metrics::MetricsSnapshot;
use cadence_runtime::clock::SystemTimebase;
use cadence_runtime::dispatcher::TickDispatcher;
use cadence_runtime::host::StandaloneHost;
use clap::Parser;
use serde::Serialize;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::signals::SignalHandler;

/// Environment variable naming a configuration file.
const CONFIG_ENV: &str = "CADENCE_CONFIG_PATH";

/// Local development configuration path.
const LOCAL_CONFIG: &str = "config/cadence.toml";

type Dispatcher = TickDispatcher<SystemTimebase, StandaloneHost>;

/// Cadence daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cadenced",
    about = "Cadence daemon - paces a tick loop at a fixed rate",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target rate in ticks per second (overrides config file).
    #[arg(long, short = 'r')]
    rate: Option<f64>,

    /// Final slice of each wait to busy-spin, e.g. "50us" (overrides config file).
    #[arg(long, value_parser = humantime::parse_duration)]
    spin_threshold: Option<Duration>,

    /// Use std::thread::sleep instead of the platform's native sleep.
    #[arg(long)]
    thread_sleep: bool,

    /// Simulated work per tick, e.g. "2ms".
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    work: Duration,

    /// Stop after this many ticks (0 = run until signalled).
    #[arg(long, default_value = "0")]
    max_ticks: u64,

    /// Log a status line every N ticks (0 = never).
    #[arg(long, default_value = "600")]
    status_every: u64,

    /// Print a JSON summary to stdout on exit.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// Final report printed with `--json`.
#[derive(Debug, Serialize)]
struct RunSummary {
    ticks: u64,
    target_rate: f64,
    interval_ns: u64,
    wall_time_ms: u128,
    metrics: Option<MetricsSnapshot>,
    percentiles_ns: Vec<(f64, u64)>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting cadence daemon");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        target_rate = config.target_rate,
        spin_threshold = %humantime::format_duration(config.spin_threshold),
        sleep_backend = ?config.sleep_backend,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::install().context("Failed to set up signal handlers")?;

    let host = StandaloneHost::new().with_max_ticks(args.max_ticks);
    let mut dispatcher =
        TickDispatcher::with_system_clock(host, &config).context("Failed to create tick dispatcher")?;

    run_daemon(&mut dispatcher, &config, &args, &signal_handler)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("cadenced={level},cadence_runtime={level},cadence_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CADENCE_CONFIG_PATH` environment variable
/// 3. `config/cadence.toml` (local development)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<CadenceConfig> {
    match config_path(args.config.as_deref(), std::env::var(CONFIG_ENV).ok().as_deref()) {
        Some(path) => {
            info!(?path, "Loading config");
            CadenceConfig::from_file(&path).with_context(|| format!("Failed to load config from {path:?}"))
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(CadenceConfig::default())
        }
    }
}

/// Pick the configuration file to read, if any.
fn config_path(cli: Option<&Path>, env: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = cli {
        return Some(path.to_path_buf());
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
        warn!(path = %env_path, "{CONFIG_ENV} set but file does not exist, checking other locations");
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    local.exists().then_some(local)
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut CadenceConfig, args: &Args) {
    if let Some(rate) = args.rate {
        config.target_rate = rate;
    }
    if let Some(threshold) = args.spin_threshold {
        config.spin_threshold = threshold;
    }
    if args.thread_sleep {
        config.sleep_backend = SleepBackend::Thread;
    }
}

/// Main tick loop. This thread is the driver.
fn run_daemon(
    dispatcher: &mut Dispatcher,
    config: &CadenceConfig,
    args: &Args,
    signal_handler: &SignalHandler,
) -> Result<()> {
    let ticks_seen = Rc::new(Cell::new(0u64));
    {
        let ticks_seen = Rc::clone(&ticks_seen);
        dispatcher.subscribe(move || ticks_seen.set(ticks_seen.get() + 1));
    }
    if !args.work.is_zero() {
        let work = args.work;
        info!(work_us = work.as_micros(), "Simulating work in every tick");
        dispatcher.subscribe(move || busy_work(work));
    }

    dispatcher
        .initialize(None)
        .context("Failed to initialize tick dispatcher")?;

    let started = Instant::now();

    while dispatcher.state().is_running() {
        if signal_handler.shutdown_requested() {
            info!("Shutdown signal received, stopping dispatcher");
            dispatcher.stop();
            break;
        }

        if signal_handler.take_reload_request() {
            reload_rate(dispatcher, args);
        }

        let report = dispatcher.tick().context("Tick failed")?;

        if args.status_every > 0 && report.tick % args.status_every == 0 {
            log_status(dispatcher);
        }
    }

    let wall_time = started.elapsed();
    info!(
        ticks = dispatcher.tick_count(),
        notified = ticks_seen.get(),
        signals = signal_handler.signal_count(),
        wall_ms = wall_time.as_millis(),
        "Cadence daemon exiting"
    );
    log_status(dispatcher);

    if args.json {
        let summary = summarize(dispatcher, config, wall_time);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

/// Re-read the configuration file and apply its target rate.
fn reload_rate(dispatcher: &mut Dispatcher, args: &Args) {
    let Some(path) = config_path(args.config.as_deref(), std::env::var(CONFIG_ENV).ok().as_deref()) else {
        warn!("Reload requested but no config file is in use");
        return;
    };

    match CadenceConfig::from_file(&path) {
        Ok(reloaded) => {
            let rate = args.rate.unwrap_or(reloaded.target_rate);
            info!(?path, rate, "Reloaded target rate");
            dispatcher.set_target(rate);
        }
        Err(e) => error!(?path, "Config reload failed: {e}"),
    }
}

/// Spin for `work`, standing in for a subscriber's real per-tick load.
fn busy_work(work: Duration) {
    let until = Instant::now() + work;
    while Instant::now() < until {
        std::hint::spin_loop();
    }
}

fn log_status(dispatcher: &Dispatcher) {
    let Some(metrics) = dispatcher.metrics() else {
        return;
    };
    let snap = metrics.snapshot();
    let us = |ns: Option<u64>| ns.map_or(0, |v| v / 1_000);

    info!(
        ticks = snap.total_ticks,
        target_us = snap.target_ns / 1_000,
        mean_us = us(snap.mean_ns),
        min_us = us(snap.min_ns),
        max_us = us(snap.max_ns),
        jitter_us = us(snap.jitter_ns()),
        overruns = snap.overrun_count,
        "Cadence status"
    );
}

fn summarize(dispatcher: &Dispatcher, config: &CadenceConfig, wall_time: Duration) -> RunSummary {
    let metrics = dispatcher.metrics();
    let percentiles_ns = metrics
        .map(|m| {
            m.percentiles(&config.metrics.percentiles)
                .into_iter()
                .map(|(p, d)| (p, u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)))
                .collect()
        })
        .unwrap_or_default();

    RunSummary {
        ticks: dispatcher.tick_count(),
        target_rate: dispatcher.cadence().rate(),
        interval_ns: dispatcher.cadence().frequency().ticks_to_nanos(dispatcher.cadence().interval_ticks()),
        wall_time_ms: wall_time.as_millis(),
        metrics: metrics.map(cadence_common::metrics::TickMetrics::snapshot),
        percentiles_ns,
    }
}
