//! Backer - Main entry point
//!
//! Backs up the configured source trees to the first trusted destination found.

use anyhow::{Context, Result};
use backer::{shutdown::ShutdownCoordinator, utils, Config, Engine, RunOptions};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "backer.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Report what would be copied without touching any file
    #[arg(short = 'n', long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting backer v{} ({})",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );

    let cancel_token = CancellationToken::new();
    let shutdown_coordinator = ShutdownCoordinator::new(cancel_token.clone());

    let engine = Engine::with_cancel(config, cancel_token);
    let options = RunOptions {
        dry_run: args.dry_run,
    };

    // The engine is blocking; signals are handled here
    let mut run = tokio::task::spawn_blocking(move || engine.run(&options));

    let result = tokio::select! {
        result = &mut run => result,
        _ = shutdown_coordinator.wait_for_signal() => run.await,
    };

    let summary = result.context("Backup task panicked")??;
    tracing::info!("{}", summary);

    Ok(())
}
