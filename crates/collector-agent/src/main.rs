//! Collector agent — registers this host with the control plane and keeps
//! the registration alive until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use collector_identity::{
    CollectorExtension, DefaultHost, Extension, ExtensionConfig, LocalFsCredentialsStore, StopSignal,
};
use tracing::info;

/// How long shutdown may take before giving up on the heartbeat task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "collector-agent", about = "Collector registration and heartbeat agent")]
struct Args {
    /// JSON configuration file. Without it, configuration is read from
    /// `COLLECTOR_*` environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-register even when stored credentials exist.
    #[arg(long)]
    clobber: bool,

    /// Override the control-plane API base URL.
    #[arg(long)]
    api_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging (controlled via RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExtensionConfig::load(path)?,
        None => ExtensionConfig::from_env(),
    };
    if args.clobber {
        config.clobber = true;
    }
    if let Some(url) = args.api_base_url {
        config.api_base_url = url;
    }

    let store = LocalFsCredentialsStore::new(config.credentials_directory());
    info!(directory = %store.directory().display(), "using credentials directory");

    let mut extension = CollectorExtension::new(config, Arc::new(store))?;

    // Ctrl-C during registration aborts the start; afterwards it triggers
    // shutdown.
    let interrupted = StopSignal::new();
    let interrupt = interrupted.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.fire();
        }
    });

    extension.start(&interrupted, &DefaultHost).await?;
    info!(
        collector_name = %extension.collector_name(),
        collector_id = %extension.collector_id(),
        base_url = %extension.base_url(),
        "collector running, press Ctrl-C to stop"
    );

    interrupted.fired().await;
    info!("shutting down");

    let deadline = StopSignal::new();
    let timer = deadline.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
        timer.fire();
    });
    extension.shutdown(&deadline).await?;

    let stats = extension.heartbeat_stats();
    info!(sent = stats.sent(), failed = stats.failed(), "collector stopped");
    Ok(())
}
