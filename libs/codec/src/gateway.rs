//! Gateway envelopes
//!
//! HTTP bodies accepted and returned by the gateway, plus the directory
//! payloads (handle list, service offering heartbeat).

use crate::message::ServiceMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use types::{Credentials, OrphanSet, ProvisionedServiceHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayProvisionRequest {
    pub label: String,
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ServiceMessage for GatewayProvisionRequest {
    const KIND: &'static str = "GatewayProvisionRequest";
}

/// Returned for provision, and also the body of a bind response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayProvisionResponse {
    pub service_id: String,
    pub configuration: Value,
    pub credentials: Credentials,
}

impl From<ProvisionedServiceHandle> for GatewayProvisionResponse {
    fn from(handle: ProvisionedServiceHandle) -> Self {
        Self {
            service_id: handle.service_id,
            configuration: handle.configuration,
            credentials: handle.credentials,
        }
    }
}

impl ServiceMessage for GatewayProvisionResponse {
    const KIND: &'static str = "GatewayProvisionResponse";
}

pub type GatewayBindResponse = GatewayProvisionResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBindRequest {
    pub service_id: String,
    pub label: String,
    #[serde(default)]
    pub binding_options: Value,
}

impl ServiceMessage for GatewayBindRequest {
    const KIND: &'static str = "GatewayBindRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayUnbindRequest {
    pub service_id: String,
    pub handle_id: String,
    #[serde(default)]
    pub binding_options: Value,
}

impl ServiceMessage for GatewayUnbindRequest {
    const KIND: &'static str = "GatewayUnbindRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRestoreRequest {
    pub instance_id: String,
    pub backup_path: String,
}

impl ServiceMessage for GatewayRestoreRequest {
    const KIND: &'static str = "GatewayRestoreRequest";
}

/// Re-create an instance elsewhere from its last known handles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRecoverRequest {
    pub instance_id: String,
    pub backup_path: String,
    /// Instance handle plus every binding handle known before the failure
    pub handles: Vec<ProvisionedServiceHandle>,
}

impl ServiceMessage for GatewayRecoverRequest {
    const KIND: &'static str = "GatewayRecoverRequest";
}

/// Trigger for a reconciliation cycle. Without `handles` the gateway fetches
/// the baseline from the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOrphanRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handles: Option<Vec<ProvisionedServiceHandle>>,
}

impl ServiceMessage for CheckOrphanRequest {
    const KIND: &'static str = "CheckOrphanRequest";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOrphanHttpRequest {
    #[serde(default)]
    pub orphan_instances: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub orphan_bindings: BTreeMap<String, Vec<Credentials>>,
}

impl ServiceMessage for PurgeOrphanHttpRequest {
    const KIND: &'static str = "PurgeOrphanHttpRequest";
}

/// Staging and final orphan sets of the current cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanReport {
    pub staging: OrphanSet,
    #[serde(rename = "final")]
    pub final_set: OrphanSet,
}

impl ServiceMessage for OrphanReport {
    const KIND: &'static str = "OrphanReport";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceListResponse {
    pub instances: Vec<String>,
}

impl ServiceMessage for InstanceListResponse {
    const KIND: &'static str = "InstanceListResponse";
}

/// Authoritative handle list served by the directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleList {
    #[serde(default)]
    pub handles: Vec<ProvisionedServiceHandle>,
}

impl ServiceMessage for HandleList {
    const KIND: &'static str = "HandleList";
}

/// Heartbeat body advertising the service to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub label: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    pub url: String,
    #[serde(default)]
    pub plans: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ServiceMessage for ServiceOffering {
    const KIND: &'static str = "ServiceOffering";
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::credentials::NAME;

    #[test]
    fn test_orphan_report_uses_final_key() {
        let mut report = OrphanReport::default();
        report.final_set.instances.insert("n1".into(), vec!["x".into()]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["final"]["instances"]["n1"][0], "x");
        assert!(json.get("final_set").is_none());
    }

    #[test]
    fn test_bind_request_without_options() {
        let req = GatewayBindRequest::decode(br#"{"service_id":"db-1","label":"kv-1.0"}"#).unwrap();
        assert!(req.binding_options.is_null());
    }

    #[test]
    fn test_check_orphan_body_may_be_empty_object() {
        let req = CheckOrphanRequest::decode(b"{}").unwrap();
        assert!(req.handles.is_none());
    }

    #[test]
    fn test_provision_response_from_handle() {
        let handle = ProvisionedServiceHandle::instance(
            "db-1",
            "free",
            None,
            Credentials::new().with(NAME, "db-1"),
        );
        let body = GatewayProvisionResponse::from(handle);
        assert_eq!(body.service_id, "db-1");
        assert_eq!(body.configuration["plan"], "free");
    }
}
