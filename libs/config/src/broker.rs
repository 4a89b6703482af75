//! # Broker Configuration
//!
//! One file configures every broker process; each binary reads the sections
//! it needs.
//!
//! ```toml
//! [service]
//! name = "kv"                  # bus subject prefix
//! label = "kv-1.0"
//! version = "1.0"
//!
//! [service.plans.free]
//! allow_over_provisioning = false
//!
//! [bus]
//! relay_address = "127.0.0.1:4222"
//! max_payload = 1048576
//!
//! [provisioner]
//! node_timeout_ms = 2000
//! discover_timeout_ms = 2000
//!
//! [node]
//! node_id = "node-0"
//! plan = "free"
//! capacity = 200
//!
//! [gateway]
//! port = 8181
//! token = "changeme"
//! directory_uri = "http://127.0.0.1:8080"
//! orphan_check_interval_secs = 3600   # omit to disable
//! ```

use crate::defaults;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Chunking needs room for the envelope plus one item
pub const MIN_MAX_PAYLOAD: usize = 1536;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub service: ServiceSection,
    pub bus: BusSection,
    pub provisioner: ProvisionerSection,
    pub node: NodeSection,
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    pub name: String,
    pub label: String,
    pub version: String,
    pub description: String,
    pub plans: HashMap<String, PlanConfig>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Schedule onto nodes whose best score is zero or below
    pub allow_over_provisioning: bool,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusSection {
    pub relay_address: String,
    pub max_payload: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionerSection {
    pub node_timeout_ms: u64,
    pub discover_timeout_ms: u64,
    pub node_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeSection {
    pub node_id: String,
    pub plan: String,
    pub capacity: i64,
    pub capacity_unit: u64,
    pub announce_interval_secs: u64,
    pub supported_versions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewaySection {
    pub bind_address: String,
    pub port: u16,
    pub token: String,
    pub request_timeout_ms: u64,
    pub directory_uri: String,
    pub directory_token: String,
    pub heartbeat_interval_secs: u64,
    pub handle_refresh_interval_secs: u64,
    pub orphan_check_interval_secs: Option<u64>,
    pub double_check_delay_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        let mut plans = HashMap::new();
        plans.insert(defaults::service::DEFAULT_PLAN.to_string(), PlanConfig::default());
        Self {
            name: defaults::service::NAME.to_string(),
            label: defaults::service::LABEL.to_string(),
            version: defaults::service::VERSION.to_string(),
            description: String::new(),
            plans,
            tags: Vec::new(),
        }
    }
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            relay_address: defaults::bus::RELAY_ADDRESS.to_string(),
            max_payload: defaults::bus::MAX_PAYLOAD,
        }
    }
}

impl Default for ProvisionerSection {
    fn default() -> Self {
        Self {
            node_timeout_ms: defaults::provisioner::NODE_TIMEOUT_MS,
            discover_timeout_ms: defaults::provisioner::DISCOVER_TIMEOUT_MS,
            node_ttl_secs: defaults::provisioner::NODE_TTL_SECS,
            sweep_interval_secs: defaults::provisioner::SWEEP_INTERVAL_SECS,
        }
    }
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            node_id: defaults::node::NODE_ID.to_string(),
            plan: defaults::service::DEFAULT_PLAN.to_string(),
            capacity: defaults::node::CAPACITY,
            capacity_unit: defaults::node::CAPACITY_UNIT,
            announce_interval_secs: defaults::node::ANNOUNCE_INTERVAL_SECS,
            supported_versions: Vec::new(),
        }
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_address: defaults::gateway::BIND_ADDRESS.to_string(),
            port: defaults::gateway::PORT,
            token: defaults::gateway::TOKEN.to_string(),
            request_timeout_ms: defaults::gateway::REQUEST_TIMEOUT_MS,
            directory_uri: defaults::gateway::DIRECTORY_URI.to_string(),
            directory_token: String::new(),
            heartbeat_interval_secs: defaults::gateway::HEARTBEAT_INTERVAL_SECS,
            handle_refresh_interval_secs: defaults::gateway::HANDLE_REFRESH_INTERVAL_SECS,
            orphan_check_interval_secs: None,
            double_check_delay_secs: defaults::gateway::DOUBLE_CHECK_DELAY_SECS,
        }
    }
}

impl ServiceSection {
    pub fn plan(&self, plan: &str) -> Option<&PlanConfig> {
        self.plans.get(plan)
    }

    pub fn allows_over_provisioning(&self, plan: &str) -> bool {
        self.plan(plan).map(|p| p.allow_over_provisioning).unwrap_or(false)
    }

    /// Plan names, sorted
    pub fn plan_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plans.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ProvisionerSection {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn discover_timeout(&self) -> Duration {
        Duration::from_millis(self.discover_timeout_ms)
    }

    pub fn node_ttl(&self) -> Duration {
        Duration::from_secs(self.node_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl NodeSection {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }
}

impl GatewaySection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn handle_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.handle_refresh_interval_secs)
    }

    pub fn orphan_check_interval(&self) -> Option<Duration> {
        self.orphan_check_interval_secs.map(Duration::from_secs)
    }

    pub fn double_check_delay(&self) -> Duration {
        Duration::from_secs(self.double_check_delay_secs)
    }

    /// Address the gateway advertises to the directory
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.bind_address, self.port)
    }
}

impl BrokerConfig {
    /// Parse a TOML document without environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            bail!("service.name cannot be empty");
        }
        if self.service.name.contains(['.', '*', '>', ' ']) {
            bail!("service.name must be a single subject token");
        }
        if self.service.plans.is_empty() {
            bail!("service.plans must define at least one plan");
        }
        if self.bus.max_payload < MIN_MAX_PAYLOAD {
            bail!(
                "bus.max_payload must be at least {} bytes (got {})",
                MIN_MAX_PAYLOAD,
                self.bus.max_payload
            );
        }
        if self.provisioner.node_timeout_ms == 0 || self.provisioner.discover_timeout_ms == 0 {
            bail!("provisioner timeouts must be greater than zero");
        }
        if self.provisioner.node_ttl_secs == 0 || self.provisioner.sweep_interval_secs == 0 {
            bail!("provisioner node_ttl_secs and sweep_interval_secs must be greater than zero");
        }
        if self.node.node_id.is_empty() {
            bail!("node.node_id cannot be empty");
        }
        if self.node.node_id.contains(['.', '*', '>', ' ']) {
            bail!("node.node_id must be a single subject token");
        }
        if self.node.plan.is_empty() {
            bail!("node.plan cannot be empty");
        }
        if self.service.plan(&self.node.plan).is_none() {
            bail!("node.plan '{}' is not defined in service.plans", self.node.plan);
        }
        if self.node.announce_interval_secs == 0 {
            bail!("node.announce_interval_secs must be greater than zero");
        }
        if self.gateway.token.is_empty() {
            bail!("gateway.token cannot be empty");
        }
        if self.gateway.request_timeout_ms == 0 {
            bail!("gateway.request_timeout_ms must be greater than zero");
        }
        if self.gateway.heartbeat_interval_secs == 0 || self.gateway.handle_refresh_interval_secs == 0 {
            bail!("gateway loop intervals must be greater than zero");
        }
        if self.gateway.orphan_check_interval_secs == Some(0) {
            bail!("gateway.orphan_check_interval_secs must be greater than zero when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BrokerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bus.max_payload, 1024 * 1024);
        assert_eq!(config.provisioner.node_timeout(), Duration::from_secs(2));
        assert_eq!(config.provisioner.node_ttl(), Duration::from_secs(300));
        assert_eq!(config.node.capacity, 200);
        assert_eq!(config.gateway.request_timeout(), Duration::from_millis(5000));
        assert!(config.gateway.orphan_check_interval().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BrokerConfig::from_toml_str(
            r#"
[service]
name = "redis"

[service.plans.gold]
allow_over_provisioning = true

[node]
node_id = "redis-node-1"
plan = "gold"
"#,
        )
        .unwrap();

        assert_eq!(config.service.name, "redis");
        assert!(config.service.allows_over_provisioning("gold"));
        assert!(!config.service.allows_over_provisioning("free"));
        assert_eq!(config.provisioner.discover_timeout_ms, 2000);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BrokerConfig::default();
        config.bus.max_payload = 100;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.provisioner.node_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.node.plan = "platinum".to_string();
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.service.name = "a.b".to_string();
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.gateway.orphan_check_interval_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
