//! Line repeater binary entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, info};

use line_repeater::config::ConfigLoader;
use line_repeater::logging::init_logging;
use line_repeater::repeater::{packet_channel, RepeaterEngine, UdpPacketSource};

/// Packets buffered between the listener and the engine.
const FEED_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(
    name = "line-repeater",
    version,
    about = "Repeat regex-selected metric lines to downstream collectors"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "line-repeater.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new()
        .load_or_default(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e))?;

    ConfigLoader::with_default_validators().validate(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting line-repeater"
    );

    let (sender, feed) = packet_channel(FEED_CAPACITY);
    let source = UdpPacketSource::bind(&config.listener).await?;
    info!(address = %source.local_addr(), "Listening for packets");
    let source_task = tokio::spawn(source.run(sender));

    let mut engine = RepeaterEngine::init(&config.repeater, feed).await?;

    signal::ctrl_c().await?;
    info!("Shutting down");

    let metrics = engine.metrics();
    engine
        .stop_with(|| info!("All destinations released"))
        .await;
    let _ = source_task.await;

    debug!(metrics = %metrics.to_prometheus("line_repeater"), "Final metrics");
    Ok(())
}
