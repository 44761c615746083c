//! # depthrec
//!
//! Main entry point for the depth recorder.
//!
//! `record` loads a JSON configuration file, creates one capture module per
//! configured stream and runs them until Ctrl+C. `normalize` runs the offline
//! normalization pass over one or more raw directories.
//!
//! # Usage
//!
//! ```bash
//! depthrec record config.json --log-level info
//! depthrec normalize data/binance/BTCUSDT/raw
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use depthrec_md::CaptureModule;
use tracing::{error, info, warn};

/// How often the runner checks for modules that stopped on their own.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Lossless order-book delta recorder.
#[derive(Parser)]
#[command(name = "depthrec", about = "Order-book depth delta recorder and normalizer")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record depth streams until Ctrl+C.
    Record {
        /// Configuration file path (JSON).
        config: PathBuf,

        /// Optional log directory for file output (overrides `meta.log_path`).
        #[arg(long)]
        log_dir: Option<String>,
    },
    /// Normalize and audit finalized raw files.
    Normalize {
        /// Raw directories (`.../raw`); outputs go next to them.
        #[arg(required = true)]
        raw_dirs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Record { config, log_dir } => record(config, log_dir, &cli.log_level).await,
        Command::Normalize { raw_dirs } => {
            let _guard = depthrec_core::logging::init_logging(&cli.log_level, None, "depthrec");
            normalize(raw_dirs).await
        }
    }
}

async fn record(config_path: PathBuf, log_dir: Option<String>, log_level: &str) -> Result<()> {
    // 1. Load configuration (before logging, so meta can pick the log dir)
    let config = depthrec_core::config::load_config(&config_path)?;

    // 2. Initialize logging
    let log_dir = log_dir.or_else(|| config.log_path());
    let module_name = config.module_name();
    let _guard = depthrec_core::logging::init_logging(log_level, log_dir.as_deref(), &module_name);

    info!("{module_name} starting: config={}, log_level={log_level}", config_path.display());
    info!("config loaded: {} stream(s)", config.streams.len());

    // 3. Create modules from the streams array
    let mut modules: Vec<Box<dyn CaptureModule>> = Vec::new();
    for (idx, stream) in config.streams.iter().enumerate() {
        match depthrec_md::registry::create_capture_module(stream) {
            Ok(module) => {
                info!("streams[{idx}]: created module '{}' (exchange={})", module.name(), stream.exchange);
                modules.push(module);
            }
            Err(e) => {
                error!("streams[{idx}]: failed to create module for '{}': {e}", stream.exchange);
            }
        }
    }
    if modules.is_empty() {
        bail!("no capture module could be created");
    }

    // 4. Start all modules
    for module in &mut modules {
        module.start().await?;
    }
    info!("all {} module(s) started, press Ctrl+C to stop", modules.len());

    // 5. Run until Ctrl+C or until a module dies on its own
    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown signal received");
                break;
            }
            _ = health.tick() => {
                if let Some(dead) = modules.iter().find(|m| m.is_finished()) {
                    error!("module '{}' stopped unexpectedly, shutting down", dead.name());
                    break;
                }
            }
        }
    }

    // 6. Stop all modules: each drains its queue and finalizes its open file
    let mut failed = 0usize;
    for module in &mut modules {
        info!("stopping module '{}'", module.name());
        if let Err(e) = module.stop().await {
            error!("error stopping '{}': {e}", module.name());
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} module(s) failed");
    }
    info!("all modules stopped");
    Ok(())
}

async fn normalize(raw_dirs: Vec<PathBuf>) -> Result<()> {
    let mut failed_files = 0usize;
    for raw_dir in raw_dirs {
        let dir = raw_dir.clone();
        let summary = tokio::task::spawn_blocking(move || depthrec_norm::process_raw_dir(&dir)).await??;
        if summary.files_with_gaps > 0 {
            warn!("{}: {} file(s) with update-id gaps", raw_dir.display(), summary.files_with_gaps);
        }
        failed_files += summary.failed;
    }

    if failed_files > 0 {
        bail!("{failed_files} raw file(s) could not be normalized");
    }
    Ok(())
}
