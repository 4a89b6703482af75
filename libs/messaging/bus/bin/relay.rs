//! Bus relay binary - routes frames between broker processes
//!
//! Usage:
//!   bus_relay --config config/broker.toml
//!   bus_relay --listen 0.0.0.0:4222

use anyhow::{Context, Result};
use broker_config::BrokerConfig;
use clap::Parser;
use message_bus::RelayServer;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bus_relay")]
#[command(about = "Service broker message bus relay")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides bus.relay_address
    #[arg(long)]
    listen: Option<String>,

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

    let config = BrokerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let address = args.listen.unwrap_or_else(|| config.bus.relay_address.clone());

    info!(address = %address, max_payload = config.bus.max_payload, "Starting bus relay");

    let server = RelayServer::bind(&address, config.bus.max_payload)
        .await
        .with_context(|| format!("Failed to bind relay to {}", address))?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Relay failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Bus relay stopped");
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
