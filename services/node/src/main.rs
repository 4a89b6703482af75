//! Node agent binary backed by the in-memory driver
//!
//! Usage:
//!   node --config config/broker.toml
//!   node --node-id n2 --capacity 50

use anyhow::{Context, Result};
use broker_config::BrokerConfig;
use clap::Parser;
use message_bus::RelayBus;
use node::{MemoryDriver, Node, NodeSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "node")]
#[command(about = "Service broker node agent")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node id, overrides node.node_id
    #[arg(long)]
    node_id: Option<String>,

    /// Starting capacity, overrides node.capacity
    #[arg(long)]
    capacity: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let mut config = BrokerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(node_id) = args.node_id {
        config.node.node_id = node_id;
    }
    if let Some(capacity) = args.capacity {
        config.node.capacity = capacity;
    }
    let settings = NodeSettings::from_config(&config);

    let bus = RelayBus::connect(&config.bus.relay_address, config.bus.max_payload)
        .await
        .with_context(|| format!("Failed to connect to relay at {}", config.bus.relay_address))?;
    let driver = MemoryDriver::new(settings.node_id.clone()).with_capacity_unit(config.node.capacity_unit);

    let node = Node::new(Arc::new(bus), Arc::new(driver), settings);
    node.start().await.context("Failed to start node")?;

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    node.shutdown();

    info!(node_id = %node.id(), "Node stopped");
    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
