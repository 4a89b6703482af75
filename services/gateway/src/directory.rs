//! Upstream directory access
//!
//! The directory owns the authoritative list of provisioned handles and the
//! service catalog. The gateway pulls the handle list, pushes rewritten
//! handles after recovery or migration, and heartbeats its offering.
//!
//! ```text
//! GET  {uri}/services/v1/offerings/{label}/handles        → HandleList
//! POST {uri}/services/v1/offerings/{label}/handles/{id}   ← ProvisionedServiceHandle
//! POST {uri}/services/v1/offerings                        ← ServiceOffering
//! ```

use crate::config::TOKEN_HEADER;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use codec::{HandleList, ServiceOffering};
use parking_lot::{Mutex, RwLock};
use provisioner::HandleUpdater;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use types::ProvisionedServiceHandle;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait HandleDirectory: Send + Sync + 'static {
    async fn fetch_handles(&self) -> Result<Vec<ProvisionedServiceHandle>>;

    async fn send_heartbeat(&self, offering: &ServiceOffering) -> Result<()>;
}

/// HTTP client for the directory
pub struct DirectoryClient {
    http: reqwest::Client,
    base_uri: String,
    label: String,
    token: String,
}

impl DirectoryClient {
    pub fn new(
        base_uri: impl Into<String>,
        label: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            label: label.into(),
            token: token.into(),
        })
    }

    fn offerings_url(&self) -> String {
        format!("{}/services/v1/offerings", self.base_uri)
    }

    fn handles_url(&self) -> String {
        format!("{}/{}/handles", self.offerings_url(), self.label)
    }

    async fn put_handle(&self, handle: &ProvisionedServiceHandle) -> Result<()> {
        let url = format!("{}/{}", self.handles_url(), handle.service_id);
        let response = self
            .http
            .post(&url)
            .header(TOKEN_HEADER, &self.token)
            .json(handle)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::directory(format!(
                "handle update for {} returned {}",
                handle.service_id,
                response.status()
            )));
        }
        debug!(service_id = %handle.service_id, "Pushed handle to directory");
        Ok(())
    }
}

#[async_trait]
impl HandleDirectory for DirectoryClient {
    async fn fetch_handles(&self) -> Result<Vec<ProvisionedServiceHandle>> {
        let response = self
            .http
            .get(self.handles_url())
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::directory(format!(
                "handle fetch returned {}",
                response.status()
            )));
        }
        let list: HandleList = response.json().await?;
        Ok(list.handles)
    }

    async fn send_heartbeat(&self, offering: &ServiceOffering) -> Result<()> {
        let response = self
            .http
            .post(self.offerings_url())
            .header(TOKEN_HEADER, &self.token)
            .json(offering)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::directory(format!(
                "heartbeat returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HandleUpdater for DirectoryClient {
    async fn update_handle(&self, handle: &ProvisionedServiceHandle) -> anyhow::Result<()> {
        Ok(self.put_handle(handle).await?)
    }
}

/// In-process directory, used when no directory URI is configured
#[derive(Default)]
pub struct MemoryDirectory {
    handles: RwLock<Vec<ProvisionedServiceHandle>>,
    heartbeats: Mutex<Vec<ServiceOffering>>,
    unavailable: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handles(handles: Vec<ProvisionedServiceHandle>) -> Self {
        let directory = Self::default();
        directory.set_handles(handles);
        directory
    }

    pub fn set_handles(&self, handles: Vec<ProvisionedServiceHandle>) {
        *self.handles.write() = handles;
    }

    pub fn handles(&self) -> Vec<ProvisionedServiceHandle> {
        self.handles.read().clone()
    }

    /// Make every call fail, as an unreachable directory would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn heartbeats(&self) -> Vec<ServiceOffering> {
        self.heartbeats.lock().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::directory("directory unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl HandleDirectory for MemoryDirectory {
    async fn fetch_handles(&self) -> Result<Vec<ProvisionedServiceHandle>> {
        self.check_available()?;
        Ok(self.handles())
    }

    async fn send_heartbeat(&self, offering: &ServiceOffering) -> Result<()> {
        self.check_available()?;
        self.heartbeats.lock().push(offering.clone());
        Ok(())
    }
}

#[async_trait]
impl HandleUpdater for MemoryDirectory {
    async fn update_handle(&self, handle: &ProvisionedServiceHandle) -> anyhow::Result<()> {
        self.check_available()?;
        let mut handles = self.handles.write();
        match handles.iter_mut().find(|h| h.service_id == handle.service_id) {
            Some(existing) => *existing = handle.clone(),
            None => handles.push(handle.clone()),
        }
        Ok(())
    }
}
