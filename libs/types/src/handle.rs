//! Provisioned service handles
//!
//! A handle is the provisioner's cached record of one provisioned instance
//! or one binding. Instance handles are keyed by the node-issued instance
//! name; binding handles carry credentials whose `name` points back at the
//! instance they bind.

use crate::credentials::Credentials;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedServiceHandle {
    pub service_id: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub credentials: Credentials,
}

impl ProvisionedServiceHandle {
    /// Handle for a freshly provisioned instance
    pub fn instance(
        service_id: impl Into<String>,
        plan: &str,
        version: Option<&str>,
        credentials: Credentials,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            configuration: json!({ "plan": plan, "version": version }),
            credentials,
        }
    }

    /// Handle for a binding of an instance
    pub fn binding(
        service_id: impl Into<String>,
        plan: Option<&str>,
        binding_options: Value,
        credentials: Credentials,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            configuration: json!({ "plan": plan, "data": { "binding_options": binding_options } }),
            credentials,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        self.credentials.node_id()
    }

    /// Instance name the credentials point at
    pub fn instance_name(&self) -> Option<&str> {
        self.credentials.name()
    }

    /// Binding handles point at an instance other than themselves
    pub fn is_binding(&self) -> bool {
        matches!(self.instance_name(), Some(name) if name != self.service_id)
    }

    pub fn is_binding_of(&self, instance_id: &str) -> bool {
        self.service_id != instance_id && self.instance_name() == Some(instance_id)
    }

    pub fn plan(&self) -> Option<&str> {
        self.configuration.get("plan").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.configuration.get("version").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{NAME, NODE_ID};

    fn instance() -> ProvisionedServiceHandle {
        ProvisionedServiceHandle::instance(
            "db-1",
            "free",
            Some("1.0"),
            Credentials::new().with(NAME, "db-1").with(NODE_ID, "node-a"),
        )
    }

    #[test]
    fn test_instance_handle() {
        let handle = instance();
        assert_eq!(handle.plan(), Some("free"));
        assert_eq!(handle.version(), Some("1.0"));
        assert_eq!(handle.node_id(), Some("node-a"));
        assert!(!handle.is_binding());
    }

    #[test]
    fn test_binding_handle_refers_to_instance() {
        let binding = ProvisionedServiceHandle::binding(
            "bind-1",
            Some("free"),
            json!({}),
            Credentials::new().with(NAME, "db-1").with("user", "u1"),
        );
        assert!(binding.is_binding());
        assert!(binding.is_binding_of("db-1"));
        assert!(!binding.is_binding_of("db-2"));
        assert!(!instance().is_binding_of("db-1"));
    }

    #[test]
    fn test_directory_shape_deserializes() {
        let raw = r#"{"service_id":"db-1","configuration":{"plan":"free"},"credentials":{"name":"db-1","node_id":"n"}}"#;
        let handle: ProvisionedServiceHandle = serde_json::from_str(raw).unwrap();
        assert_eq!(handle.node_id(), Some("n"));

        let sparse: ProvisionedServiceHandle = serde_json::from_str(r#"{"service_id":"x"}"#).unwrap();
        assert!(sparse.credentials.is_empty());
    }
}
