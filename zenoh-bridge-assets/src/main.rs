//! Zenoh bridge for asset-tracking telemetry.
//!
//! Polls a remote asset-location API and publishes each tracked asset's
//! current state to Zenoh, tagged with routing metadata.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tracksight_common::LoggingConfig;
use zenoh_bridge_assets::bus::ZenohBus;
use zenoh_bridge_assets::config::{AssetBridgeConfig, RunConfig};
use zenoh_bridge_assets::poller::AssetPoller;
use zenoh_bridge_assets::runner::BridgeRunner;
use zenoh_bridge_assets::source::AssetApi;

/// Zenoh bridge for asset-tracking telemetry.
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-assets")]
#[command(about = "Polls an asset-location API and publishes to Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "assets.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AssetBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    tracksight_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting zenoh-bridge-assets");
    info!("Loaded configuration from {:?}", args.config);

    let run = RunConfig::from_env(&config.tracking)
        .context("Failed to capture runtime settings")?;

    info!(
        location_id = run.location_id,
        interval_secs = run.poll_interval.as_secs(),
        "Runtime settings captured"
    );

    let bus = Arc::new(
        ZenohBus::open(&config.zenoh, &config.tracking)
            .await
            .context("Failed to open bus connection")?,
    );

    let source = AssetApi::new(&config.tracking.api_base_url);

    let mut runner = BridgeRunner::new(bus.clone());
    runner.wire_status_handler();
    runner.start(AssetPoller::new(
        source,
        bus,
        run,
        config.tracking.serialization,
    ));

    runner.run().await;

    Ok(())
}
