//! Sic bo feed client - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Sic bo feed client with round history and forecast API
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SICBO_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    sicbo_ws::init_crypto();

    let args = Args::parse();

    // Config path: CLI arg > SICBO_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SICBO_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = sicbo_bot::AppConfig::from_file(&config_path)?;

    sicbo_telemetry::init_logging(&config.telemetry.log_level)?;

    info!("Starting sicbo-bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        channels = config.channels.len(),
        api_enabled = config.api.enabled,
        "Configuration loaded"
    );

    let app = sicbo_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
