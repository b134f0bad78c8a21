//! dashsync - entry point
//!
//! Keeps bot status, trading stats and token prices in sync with the
//! dashboard backend and serves the merged state over HTTP.

use anyhow::Result;
use clap::Parser;
use dashsync_app::{AppConfig, Application};
use tracing::info;

/// dashsync host
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DASHSYNC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// or https:// connection
    dashsync_ws::init_crypto();

    let args = Args::parse();

    dashsync_telemetry::init_logging()?;

    info!("Starting dashsync v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > DASHSYNC_CONFIG env var > config/default.toml
    let config = match args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(&path)?
        }
        None => AppConfig::load()?,
    };
    info!(
        base_url = %config.api.base_url,
        channel = %config.channel.url,
        "Configuration loaded"
    );

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
