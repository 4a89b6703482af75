//! Resource driver contract
//!
//! The node core never touches the backing resource itself. Everything
//! resource-specific (creating databases, dumping data, quota handling) lives
//! behind this trait and is injected at construction.
//!
//! Drivers report failures as `anyhow::Error`. A [`ServiceError`] inside the
//! error keeps its code on the wire; anything else becomes `INTERNAL_ERROR`.

use async_trait::async_trait;
use codec::UpdatedInstance;
use serde_json::Value;
use types::{Credentials, ServiceError};

#[async_trait]
pub trait ResourceDriver: Send + Sync + 'static {
    /// Create an instance. `credentials` is set when recovering an instance
    /// that must keep its external identity.
    async fn provision(
        &self,
        plan: &str,
        version: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Credentials>;

    /// Delete an instance together with the listed bindings
    async fn unprovision(&self, name: &str, bindings: &[Credentials]) -> anyhow::Result<()>;

    async fn bind(
        &self,
        name: &str,
        bind_opts: &Value,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Credentials>;

    async fn unbind(&self, credentials: &Credentials) -> anyhow::Result<()>;

    async fn restore(&self, instance_id: &str, backup_path: &str) -> anyhow::Result<()>;

    async fn disable_instance(&self, _instance_id: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        Err(ServiceError::not_implemented("disable_instance").into())
    }

    async fn enable_instance(&self, _instance_id: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        Err(ServiceError::not_implemented("enable_instance").into())
    }

    async fn import_instance(
        &self,
        _instance_id: &str,
        _plan: Option<&str>,
        _bindings: &[Credentials],
    ) -> anyhow::Result<()> {
        Err(ServiceError::not_implemented("import_instance").into())
    }

    async fn update_instance(
        &self,
        _instance_id: &str,
        _bindings: &[Credentials],
    ) -> anyhow::Result<UpdatedInstance> {
        Err(ServiceError::not_implemented("update_instance").into())
    }

    async fn cleanup_nfs_instance(&self, _instance_id: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        Err(ServiceError::not_implemented("cleanupnfs_instance").into())
    }

    /// Every instance id held by this node
    async fn all_instances_list(&self) -> anyhow::Result<Vec<String>>;

    /// Every binding held by this node
    async fn all_bindings_list(&self) -> anyhow::Result<Vec<Credentials>>;

    /// Unready nodes neither announce nor answer discovery
    async fn is_ready(&self) -> bool {
        true
    }

    /// Capacity consumed per instance
    fn capacity_unit(&self) -> u64 {
        1
    }
}

/// Map a driver error onto the wire error
pub fn to_service_error(err: &anyhow::Error) -> ServiceError {
    err.downcast_ref::<ServiceError>()
        .cloned()
        .unwrap_or_else(ServiceError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::codes;

    #[test]
    fn test_service_error_survives_anyhow() {
        let err: anyhow::Error = ServiceError::not_found("db-1").into();
        assert!(to_service_error(&err).is(codes::NOT_FOUND));
    }

    #[test]
    fn test_raw_error_becomes_internal() {
        let err = anyhow::anyhow!("disk full on /var/vcap");
        let mapped = to_service_error(&err);
        assert!(mapped.is(codes::INTERNAL_ERROR));
        assert!(!mapped.message().contains("disk"));
    }
}
