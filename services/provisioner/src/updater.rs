//! Upstream handle updates
//!
//! Recovery and the `update` migration rewrite credentials the upstream
//! directory already holds; the provisioner pushes each rewritten handle
//! through this trait.

use async_trait::async_trait;
use tracing::debug;
use types::ProvisionedServiceHandle;

#[async_trait]
pub trait HandleUpdater: Send + Sync + 'static {
    async fn update_handle(&self, handle: &ProvisionedServiceHandle) -> anyhow::Result<()>;
}

/// Updater for deployments without an upstream directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

#[async_trait]
impl HandleUpdater for LocalOnly {
    async fn update_handle(&self, handle: &ProvisionedServiceHandle) -> anyhow::Result<()> {
        debug!(service_id = %handle.service_id, "No upstream directory, handle kept locally");
        Ok(())
    }
}
