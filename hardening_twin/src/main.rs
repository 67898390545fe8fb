//! # Hardening Twin
//!
//! Runs the induction-hardening line simulation in real time: a paced tick
//! thread drives the machine while a tokio task persists finished records
//! to a JSON-lines store. Stops on Ctrl+C or after `--duration` seconds.

use clap::Parser;
use hardening_common::config::{ConfigError, TwinConfig};
use hardening_common::consts::DEFAULT_CONFIG_PATH;
use hardening_twin::bridge::TelemetryBridge;
use hardening_twin::drift::FaultSpec;
use hardening_twin::machine::MachineController;
use hardening_twin::runner::TickRunner;
use hardening_twin::sink::JsonLinesSink;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Hardening Twin: induction-hardening line digital twin
#[derive(Parser, Debug)]
#[command(name = "hardening_twin")]
#[command(version)]
#[command(about = "Real-time induction-hardening line simulation with telemetry persistence")]
struct Args {
    /// Path to the twin configuration TOML. Defaults apply if the file is missing.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the telemetry store path.
    #[arg(long, value_name = "FILE")]
    sink: Option<PathBuf>,

    /// Stop after this many seconds (default: run until Ctrl+C).
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Start production immediately.
    #[arg(long)]
    auto_start: bool,

    /// Inject a drift fault after this many seconds.
    #[arg(long, value_name = "SECS")]
    inject_fault_after: Option<u64>,

    /// Fault to inject (drift parameter or named failure, random if omitted).
    #[arg(long, value_name = "KIND", requires = "inject_fault_after")]
    fault: Option<String>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args);

    let log_level = loaded
        .as_ref()
        .map_or("info", |(config, _)| config.shared.log_level.as_filter());
    setup_tracing(&args, log_level);

    let config = match loaded {
        Ok((config, from_file)) => {
            if !from_file {
                warn!(
                    "Config file {} not found, using defaults",
                    args.config.display()
                );
            }
            config
        }
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    };

    info!(
        "Hardening Twin v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("twin-io")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("FATAL: failed to build tokio runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(&args, config)) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Hardening Twin shutdown complete");
}

/// Load and validate the configuration. The flag is false when the file was
/// missing and defaults were used.
fn load_config(args: &Args) -> Result<(TwinConfig, bool), ConfigError> {
    match TwinConfig::load_validated(&args.config) {
        Ok(config) => Ok((config, true)),
        Err(ConfigError::FileNotFound(_)) => {
            let config = TwinConfig::default();
            config.validate()?;
            Ok((config, false))
        }
        Err(e) => Err(e),
    }
}

async fn run(args: &Args, mut config: TwinConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(sink) = &args.sink {
        config.bridge.sink_path = sink.clone();
    }
    // Reject a bad fault name before anything starts.
    let fault = args
        .fault
        .as_deref()
        .map(str::parse::<FaultSpec>)
        .transpose()?;

    let sink = JsonLinesSink::open(&config.bridge.sink_path, config.bridge.run_id).await?;
    info!(
        "Telemetry store: {} (run {})",
        sink.path().display(),
        config.bridge.run_id
    );

    let mut bridge = TelemetryBridge::new(config.bridge.capacity);
    bridge.start(sink)?;

    let mut machine = MachineController::new(&config);
    machine.attach_bridge(bridge.producer());

    let period = Duration::from_millis(config.tick.period_ms);
    let runner = TickRunner::spawn(machine, period)?;
    let control = runner.control();

    if args.auto_start {
        control.start_cycle()?;
    }

    if let Some(after) = args.inject_fault_after {
        let control = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(after)).await;
            match control.inject_fault_spec(fault) {
                Ok(()) => match fault {
                    Some(spec) => info!("Fault injected ({})", spec.param),
                    None => info!("Random fault injected"),
                },
                Err(e) => warn!("Fault injection failed: {e}"),
            }
        });
    }

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received shutdown signal");
        }
        () = deadline => info!("Run duration elapsed"),
    }

    let status = control.status();
    let stats = runner.shutdown()?;
    info!(
        "Final state {}: ok={} ng={} ({} ticks, {} records, max cycle {}us)",
        status.state,
        status.telemetry.ok_count,
        status.telemetry.ng_count,
        stats.ticks,
        stats.records,
        stats.max_cycle_time_us
    );

    bridge.flush().await?;
    bridge.stop().await?;
    Ok(())
}

fn setup_tracing(args: &Args, config_level: &str) {
    let level = if args.verbose { "debug" } else { config_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
