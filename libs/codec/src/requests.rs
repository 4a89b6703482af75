//! Node-facing envelopes
//!
//! Requests the provisioner sends to nodes and the replies and reports nodes
//! send back. Field names are the wire names.

use crate::message::{Response, ServiceMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::{Credentials, NodeAnnouncement};

/// Node announcement as published on `S.announce` or to a discover inbox
pub type Announcement = NodeAnnouncement;

impl ServiceMessage for NodeAnnouncement {
    const KIND: &'static str = "Announcement";
}

/// Broadcast asking every node serving `plan` to announce itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverRequest {
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ServiceMessage for DiscoverRequest {
    const KIND: &'static str = "DiscoverRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Prior credentials to reuse, set when recovering an instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl ServiceMessage for ProvisionRequest {
    const KIND: &'static str = "ProvisionRequest";
}

pub type ProvisionResponse = Response<Credentials>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprovisionRequest {
    pub name: String,
    /// Credentials of every binding of `name`, so dependents can be dropped
    #[serde(default)]
    pub bindings: Vec<Credentials>,
}

impl ServiceMessage for UnprovisionRequest {
    const KIND: &'static str = "UnprovisionRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    pub name: String,
    #[serde(default)]
    pub bind_opts: Value,
    /// Prior binding credentials to reuse, set when rebinding after recovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl ServiceMessage for BindRequest {
    const KIND: &'static str = "BindRequest";
}

pub type BindResponse = Response<Credentials>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbindRequest {
    pub credentials: Credentials,
}

impl ServiceMessage for UnbindRequest {
    const KIND: &'static str = "UnbindRequest";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub instance_id: String,
    pub backup_path: String,
}

impl ServiceMessage for RestoreRequest {
    const KIND: &'static str = "RestoreRequest";
}

/// One chunk of a node's full instance and binding inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHandlesReport {
    pub node_id: String,
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<Credentials>,
}

impl ServiceMessage for NodeHandlesReport {
    const KIND: &'static str = "NodeHandlesReport";
}

/// Names a node must delete; published without expecting a reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOrphanRequest {
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<Credentials>,
}

impl ServiceMessage for PurgeOrphanRequest {
    const KIND: &'static str = "PurgeOrphanRequest";
}

/// Body of every migration verb (`disable`, `enable`, `import`, `update`,
/// `cleanupnfs`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub bindings: Vec<Credentials>,
}

impl ServiceMessage for MigrationRequest {
    const KIND: &'static str = "MigrationRequest";
}

/// Credentials rewritten by an `update` migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedInstance {
    pub instance: Credentials,
    #[serde(default)]
    pub bindings: Vec<Credentials>,
}

pub type UpdateInstanceResponse = Response<UpdatedInstance>;
