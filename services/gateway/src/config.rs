//! Gateway settings

use crate::error::{GatewayError, Result};
use broker_config::{defaults, BrokerConfig};
use codec::ServiceOffering;
use std::net::SocketAddr;
use std::time::Duration;

/// Header carrying the shared secret on every gateway request and every
/// directory call
pub const TOKEN_HEADER: &str = "X-Service-Token";

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// HTTP listener
    pub bind_address: String,
    pub port: u16,

    /// Shared secret expected in [`TOKEN_HEADER`]
    pub token: String,

    /// Offering advertised to the directory; provision and bind requests
    /// must carry the same label
    pub label: String,
    pub version: String,
    pub description: String,
    pub plans: Vec<String>,
    pub tags: Vec<String>,

    /// Upper bound on a single HTTP request's provisioner work
    pub request_timeout: Duration,

    pub heartbeat_interval: Duration,
    pub handle_refresh_interval: Duration,

    /// Periodic orphan detection; `None` disables it
    pub orphan_check_interval: Option<Duration>,

    /// Gap between the two handle snapshots of an orphan cycle
    pub double_check_delay: Duration,
}

impl GatewaySettings {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            bind_address: defaults::gateway::BIND_ADDRESS.to_string(),
            port: defaults::gateway::PORT,
            token: token.into(),
            label: label.into(),
            version: defaults::service::VERSION.to_string(),
            description: String::new(),
            plans: vec![defaults::service::DEFAULT_PLAN.to_string()],
            tags: Vec::new(),
            request_timeout: Duration::from_millis(defaults::gateway::REQUEST_TIMEOUT_MS),
            heartbeat_interval: Duration::from_secs(defaults::gateway::HEARTBEAT_INTERVAL_SECS),
            handle_refresh_interval: Duration::from_secs(
                defaults::gateway::HANDLE_REFRESH_INTERVAL_SECS,
            ),
            orphan_check_interval: None,
            double_check_delay: Duration::from_secs(defaults::gateway::DOUBLE_CHECK_DELAY_SECS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_double_check_delay(mut self, delay: Duration) -> Self {
        self.double_check_delay = delay;
        self
    }

    pub fn with_orphan_check_interval(mut self, interval: Duration) -> Self {
        self.orphan_check_interval = Some(interval);
        self
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            bind_address: config.gateway.bind_address.clone(),
            port: config.gateway.port,
            token: config.gateway.token.clone(),
            label: config.service.label.clone(),
            version: config.service.version.clone(),
            description: config.service.description.clone(),
            plans: config.service.plan_names(),
            tags: config.service.tags.clone(),
            request_timeout: config.gateway.request_timeout(),
            heartbeat_interval: config.gateway.heartbeat_interval(),
            handle_refresh_interval: config.gateway.handle_refresh_interval(),
            orphan_check_interval: config.gateway.orphan_check_interval(),
            double_check_delay: config.gateway.double_check_delay(),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| GatewayError::configuration(format!("Invalid bind address: {}", e)))
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.bind_address, self.port)
    }

    /// Heartbeat body
    pub fn offering(&self, active: bool) -> ServiceOffering {
        ServiceOffering {
            label: self.label.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            active,
            url: self.url(),
            plans: self.plans.clone(),
            tags: self.tags.clone(),
        }
    }
}
