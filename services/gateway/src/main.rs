//! Gateway binary
//!
//! Connects to the relay, runs an in-process provisioner and serves the
//! HTTP surface. With an empty `gateway.directory_uri` the handle list is
//! kept in memory.
//!
//! Usage:
//!   gateway --config config/broker.toml
//!   gateway --port 9000 --json-logs

use anyhow::{Context, Result};
use broker_config::BrokerConfig;
use clap::Parser;
use gateway::{routes, DirectoryClient, Gateway, GatewaySettings, HandleDirectory, MemoryDirectory};
use message_bus::RelayBus;
use provisioner::{HandleUpdater, Provisioner, ProvisionerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Service broker HTTP gateway")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overrides gateway.port
    #[arg(short, long)]
    port: Option<u16>,

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
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    let settings = GatewaySettings::from_config(&config);
    let addr = settings.socket_addr()?;

    let (directory, updater): (Arc<dyn HandleDirectory>, Arc<dyn HandleUpdater>) =
        if config.gateway.directory_uri.is_empty() {
            info!("No directory configured, keeping handles in memory");
            let directory = Arc::new(MemoryDirectory::new());
            (directory.clone(), directory)
        } else {
            let client = Arc::new(DirectoryClient::new(
                config.gateway.directory_uri.clone(),
                settings.label.clone(),
                config.gateway.directory_token.clone(),
            )?);
            (client.clone(), client)
        };

    let bus = RelayBus::connect(&config.bus.relay_address, config.bus.max_payload)
        .await
        .with_context(|| format!("Failed to connect to relay at {}", config.bus.relay_address))?;
    let provisioner = Arc::new(
        Provisioner::new(Arc::new(bus), ProvisionerSettings::from_config(&config))
            .with_handle_updater(updater),
    );
    provisioner.start().await.context("Failed to start provisioner")?;

    let gateway = Arc::new(Gateway::new(provisioner.clone(), directory, settings));
    gateway.start();

    let (bound, server) = warp::serve(routes(gateway.clone()))
        .try_bind_with_graceful_shutdown(addr, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .context("Failed to bind HTTP listener")?;
    info!(address = %bound, "Gateway listening");
    server.await;

    gateway.shutdown().await;
    provisioner.shutdown();
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
