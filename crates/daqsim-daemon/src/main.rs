//! DAQ Simulator Daemon
//!
//! Headless front end for the simulated data-acquisition module: samples the
//! sensors on one timer, logs filtered readings on another and reports
//! progress through the log stream until interrupted.

mod config;
mod state;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Settings, TomlConfig};
use state::Acquisition;

#[derive(Parser)]
#[command(name = "daqsimd")]
#[command(about = "Simulated data-acquisition daemon")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Directory for log files (overrides the configuration)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    // Load configuration
    let config = TomlConfig::load_or_default(&cli.config);
    let mut settings = Settings::from_lookup(&config);
    if let Some(dir) = cli.log_dir {
        settings.log_dir = dir;
    }

    if cli.print_config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let acquisition = Acquisition::new(&settings);
    if acquisition.is_log_usable() {
        info!("Logging to {}", acquisition.log_path().display());
        info!("Columns: {}", acquisition.header().join(", "));
    } else {
        warn!(
            "Data log unavailable at {}. Sampling continues without logging.",
            acquisition.log_path().display()
        );
    }

    acquisition.on_sample(|snapshot| {
        for reading in &snapshot.analogue {
            debug!(
                "{}: raw {} value {:.3} filtered {:.3}",
                reading.name, reading.raw, reading.value, reading.filtered
            );
        }
        for reading in &snapshot.digital {
            debug!("{}: {}", reading.name, if reading.on { "ON" } else { "OFF" });
        }
    });
    acquisition.on_log(|status| {
        if status.ok {
            info!("Log entries: {}", status.entries);
        } else {
            warn!("Log entries: {} (!) write failed", status.entries);
        }
    });

    acquisition.start();

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let run_for = cli
        .duration
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
    let deadline = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = deadline => {
            info!("Run duration elapsed, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    // Timer threads block while joining; keep them off the async workers
    let stopper = acquisition.clone();
    tokio::task::spawn_blocking(move || stopper.stop()).await?;

    info!(
        "Wrote {} log entries to {}",
        acquisition.entries(),
        acquisition.log_path().display()
    );

    Ok(())
}
