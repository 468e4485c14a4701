//! Browser native messaging host
//!
//! Launched by the browser with the extension on the other end of
//! stdin/stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use prompt_sync::host::{self, HostConfig, NativeHost};
use prompt_sync::signal::shutdown_signal;
use prompt_sync::sync::NotifyWatcher;

#[derive(Parser, Debug)]
#[command(name = "pm-native-host")]
#[command(about = "Native messaging host for the prompt manager extension")]
#[command(version)]
struct Args {
    /// Config file (JSON with a `dataPath` field)
    #[arg(long, env = "PM_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the sync document, overrides the config file
    #[arg(long, env = "PM_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config =
        HostConfig::load(args.config.as_deref()).context("Failed to load host configuration")?;
    if let Some(data_path) = args.data_path {
        config = HostConfig::new(data_path);
    }
    info!("Starting pm-native-host v{}", env!("CARGO_PKG_VERSION"));

    let mut native_host = NativeHost::new(config);
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(host::run(
        &mut native_host,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &NotifyWatcher,
        shutdown_signal(),
    ))?;
    Ok(())
}
