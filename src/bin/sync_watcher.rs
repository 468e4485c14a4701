//! Sync file watcher daemon
//!
//! Merges the externally written sync file into the local app-data
//! document whenever it changes. Configured through `PM_*` environment
//! variables (see `prompt_sync::sync::config`).
//!
//! ```bash
//! PM_APP_DATA_FILE=~/.local/share/prompt-manager/prompts.json pm-sync-watcher
//! PM_APP_DATA_FILE=./prompts.json PM_MODE=prompts pm-sync-watcher --once
//! ```

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use prompt_sync::signal::shutdown_signal;
use prompt_sync::sync::{CycleOutcome, NotifyWatcher, SyncConfig, SyncDaemon};

#[derive(Parser, Debug)]
#[command(name = "pm-sync-watcher")]
#[command(about = "Merge the prompt sync file into the local app data")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run one merge cycle and exit
    #[arg(long)]
    once: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = SyncConfig::from_env().context("Invalid sync watcher configuration")?;
    info!("Starting pm-sync-watcher v{}", env!("CARGO_PKG_VERSION"));

    let mut daemon = SyncDaemon::new(config);

    if args.once {
        return Ok(match daemon.run_cycle() {
            CycleOutcome::Failed(_) => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        });
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(daemon.run(&NotifyWatcher, shutdown_signal()))?;

    let stats = daemon.stats();
    info!(
        "Stopped after {} cycles ({} merged, {} skipped, {} failed)",
        stats.total_cycles, stats.merged_cycles, stats.skipped_cycles, stats.failed_cycles
    );
    Ok(ExitCode::SUCCESS)
}
