//! Configuration loading
//!
//! Layers, lowest priority first: built-in defaults, an optional TOML file,
//! then `BROKER_`-prefixed environment variables with `__` between nested
//! keys (`BROKER_GATEWAY__PORT=9000`, `BROKER_NODE__NODE_ID=node-7`).

use crate::broker::BrokerConfig;
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "BROKER";

impl BrokerConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading broker configuration");
            builder = builder.add_source(File::from(path).required(true));
        } else {
            debug!("No configuration file given, using defaults and environment");
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: BrokerConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Convenience function used by the service binaries
pub fn load_config(path: Option<&Path>) -> Result<BrokerConfig> {
    BrokerConfig::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("broker.toml");

        let config_content = r#"
[service]
name = "mysql"
label = "mysql-5.7"

[service.plans.free]
allow_over_provisioning = false

[node]
node_id = "mysql-node-3"
capacity = 50

[gateway]
token = "secret"
orphan_check_interval_secs = 3600
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = BrokerConfig::load(Some(&config_path)).unwrap();

        assert_eq!(config.service.name, "mysql");
        assert_eq!(config.node.node_id, "mysql-node-3");
        assert_eq!(config.node.capacity, 50);
        assert_eq!(config.gateway.token, "secret");
        assert_eq!(config.gateway.orphan_check_interval_secs, Some(3600));
        assert_eq!(config.bus.max_payload, 1024 * 1024);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(BrokerConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("broker.toml");
        fs::write(&config_path, "[node]\nnode_id = \"\"\n").unwrap();
        assert!(BrokerConfig::load(Some(&config_path)).is_err());
    }
}
