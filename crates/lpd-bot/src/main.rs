//! Launchpad detector session host - Entry Point

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::{info, warn};

/// Launchpad detector session host
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LPD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any feed connection
    lpd_ws::init_crypto();

    let args = Args::parse();

    // CLI arg > LPD_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("LPD_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = lpd_bot::AppConfig::load(&config_path)?;

    lpd_telemetry::init_logging_with(&config.telemetry.log_level)?;

    info!("Starting launchpad detector v{}", env!("CARGO_PKG_VERSION"));
    if Path::new(&config_path).exists() {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(config_path = %config_path, "Config file not found, using defaults");
    }
    info!(
        categories = config.categories.len(),
        cache = %config.cache.path,
        bridge = config.bridge.enabled,
        "Configuration summary"
    );

    let app = lpd_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
