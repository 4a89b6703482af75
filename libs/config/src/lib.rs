//! # Broker Configuration
//!
//! Centralized configuration for the node, provisioner and gateway
//! processes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker_config::BrokerConfig;
//! use std::path::Path;
//!
//! let config = BrokerConfig::load(Some(Path::new("config/broker.toml")))?;
//! let timeout = config.provisioner.node_timeout();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod broker;
pub mod defaults;
pub mod service_config;

pub use broker::{
    BrokerConfig, BusSection, GatewaySection, NodeSection, PlanConfig, ProvisionerSection,
    ServiceSection, MIN_MAX_PAYLOAD,
};
pub use service_config::{load_config, ENV_PREFIX};
