//! # Vessel Range Application Entry Point
//!
//! Reads telemetry frames as newline-delimited JSON (stdin or a file), prints
//! one estimate per frame on stdout and keeps the calibration on disk between
//! runs. Logs go to stderr so stdout stays machine-readable.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vessel_range_lib::config::{Config, CONFIG_FILE};
use vessel_range_lib::feed::{self, FeedSummary};
use vessel_range_lib::{calibration_store, Estimator, Strategy};

#[derive(Parser, Debug)]
#[command(name = "vessel-range")]
#[command(about = "Remaining range and battery time for electric vessels", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Telemetry frames (NDJSON). Reads stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Strategy to run instead of the configured one
    /// (overall-average, time-average, rolling-average)
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Calibration file instead of the configured one
    #[arg(long)]
    state: Option<PathBuf>,

    /// Discard calibration history (zero the run count) before starting
    #[arg(long)]
    reset_calibration: bool,

    /// Neither load nor save the calibration file
    #[arg(long)]
    no_persist: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Save `config` with the CLI strategy override applied to `--config`.
fn write_config(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let mut config = config.clone();
    if let Some(strategy) = cli.strategy {
        config.estimator.strategy = strategy;
    }
    config
        .save(&cli.config)
        .with_context(|| format!("failed to write {}", cli.config.display()))
}

/// Build the estimator from config, saved calibration and CLI overrides.
fn build_estimator(cli: &Cli, config: &Config) -> anyhow::Result<(Estimator, Option<PathBuf>)> {
    let mut estimator =
        Estimator::from_config(config).context("invalid estimator configuration")?;

    if let Some(strategy) = cli.strategy {
        estimator.set_strategy(strategy);
    }

    let calibration_path = if cli.no_persist {
        None
    } else {
        Some(
            cli.state
                .clone()
                .unwrap_or_else(|| config.state.calibration_path.clone()),
        )
    };

    if let Some(path) = &calibration_path {
        match calibration_store::load(path) {
            Ok(stored) => {
                info!(
                    run_count = stored.calibration.run_count,
                    saved_at = %stored.saved_at,
                    "resuming saved calibration"
                );
                estimator = estimator.with_calibration(stored.calibration);
            }
            Err(e) => {
                // First run on a new vessel lands here too
                warn!(path = %path.display(), "no usable saved calibration ({e}), using config seed");
            }
        }
    }

    if cli.reset_calibration {
        estimator.reset_calibration();
        if let Some(path) = &calibration_path {
            calibration_store::save(path, estimator.calibration())
                .with_context(|| format!("saving reset calibration to {}", path.display()))?;
        }
    }

    Ok((estimator, calibration_path))
}

/// Feed the estimator from `input` (or stdin) and write estimates to stdout.
async fn run_feed(
    input: Option<&Path>,
    estimator: &mut Estimator,
    calibration_path: Option<&Path>,
) -> anyhow::Result<FeedSummary> {
    let stdout = tokio::io::stdout();
    let summary = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening telemetry input {}", path.display()))?;
            feed::run(estimator, BufReader::new(file), stdout, calibration_path).await?
        }
        None => {
            feed::run(
                estimator,
                BufReader::new(tokio::io::stdin()),
                stdout,
                calibration_path,
            )
            .await?
        }
    };
    Ok(summary)
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load_from_path(&cli.config);
    if cli.write_config {
        return write_config(&cli, &config);
    }
    let (mut estimator, calibration_path) = build_estimator(&cli, &config)?;

    info!(
        strategy = %estimator.strategy(),
        capacity_kwh = estimator.capacity(),
        distance_avg = estimator.calibration().distance_avg,
        time_avg = estimator.calibration().time_avg,
        run_count = estimator.calibration().run_count,
        "estimator ready"
    );

    // Create Tokio runtime for the async feed loop
    let rt = tokio::runtime::Runtime::new()?;

    let summary = rt.block_on(run_feed(
        cli.input.as_deref(),
        &mut estimator,
        calibration_path.as_deref(),
    ))?;

    if summary.malformed > 0 {
        warn!(malformed = summary.malformed, "some telemetry lines were skipped");
    }

    Ok(())
}
