//! Gateway core
//!
//! Owns everything the HTTP layer needs besides routing: request admission,
//! the request timeout, the directory handle cache refresh, heartbeats and
//! the two-phase orphan cycle.
//!
//! ## Request Timeout
//!
//! Provisioner work runs in its own task. When it outlives the request
//! timeout the HTTP client gets SERVICE_UNAVAILABLE and the task keeps
//! running; its late result is logged and dropped.
//!
//! ```text
//!             ┌──────── request_timeout ────────┐
//! handler ──► spawn(work) ─────────────────────► reply
//!                 │                        └─► 503, work continues
//!                 ▼
//!            provisioner
//! ```

use crate::config::GatewaySettings;
use crate::directory::HandleDirectory;
use crate::error::Result;
use parking_lot::Mutex;
use provisioner::Provisioner;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use types::{codes, OrphanSet, ProvisionedServiceHandle, ServiceError, ServiceResult};

pub struct Gateway {
    provisioner: Arc<Provisioner>,
    directory: Arc<dyn HandleDirectory>,
    settings: GatewaySettings,
    handles_loaded: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(
        provisioner: Arc<Provisioner>,
        directory: Arc<dyn HandleDirectory>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            provisioner,
            directory,
            settings,
            handles_loaded: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }

    pub fn handles_loaded(&self) -> bool {
        self.handles_loaded.load(Ordering::SeqCst)
    }

    pub fn authorize(&self, token: Option<&str>) -> ServiceResult<()> {
        match token {
            Some(token) if token == self.settings.token => Ok(()),
            _ => Err(ServiceError::new(codes::NOT_AUTHORIZED)),
        }
    }

    /// Fails until the first successful directory fetch
    pub fn ensure_handles_loaded(&self) -> ServiceResult<()> {
        if self.handles_loaded() {
            Ok(())
        } else {
            Err(ServiceError::new(codes::HANDLES_NOT_LOADED))
        }
    }

    /// Label carried by provision and bind bodies must match the offering
    pub fn check_label(&self, label: &str) -> ServiceResult<()> {
        if label == self.settings.label {
            Ok(())
        } else {
            Err(ServiceError::with_arg(codes::UNKNOWN_LABEL, label))
        }
    }

    /// Run provisioner work under the request timeout
    pub async fn execute<T, F>(&self, operation: &'static str, work: F) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: Future<Output = ServiceResult<T>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let result = work.await;
            if let Err(e) = &result {
                debug!(operation, code = e.error_code(), error = %e, "Request failed");
            }
            result
        });

        match tokio::time::timeout(self.settings.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(operation, error = %e, "Request task aborted");
                Err(ServiceError::internal())
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.settings.request_timeout.as_millis() as u64,
                    "Request timed out, work continues in background"
                );
                Err(ServiceError::service_unavailable())
            }
        }
    }

    /// Replace the provisioner's handle cache with the directory's list
    pub async fn refresh_handles(&self) -> Result<usize> {
        let handles = self.directory.fetch_handles().await?;
        let count = handles.len();
        self.provisioner.update_handles(handles);
        if !self.handles_loaded.swap(true, Ordering::SeqCst) {
            info!(handles = count, "Initial handle list loaded");
        } else {
            debug!(handles = count, "Handle list refreshed");
        }
        Ok(count)
    }

    pub async fn send_heartbeat(&self, active: bool) -> Result<()> {
        self.directory
            .send_heartbeat(&self.settings.offering(active))
            .await
    }

    /// First phase of an orphan cycle. The second phase runs after
    /// `double_check_delay` on a background task.
    pub async fn check_orphan(
        self: &Arc<Self>,
        handles: Option<Vec<ProvisionedServiceHandle>>,
    ) -> ServiceResult<()> {
        let known = match handles {
            Some(handles) => handles,
            None => self.directory.fetch_handles().await.map_err(|e| {
                warn!(error = %e, "Cannot fetch handles for orphan check");
                ServiceError::with_arg(codes::ORPHAN_CHECK_FAILED, e.to_string())
            })?,
        };
        self.provisioner.check_orphan(&known).await?;

        let weak = Arc::downgrade(self);
        let delay = self.settings.double_check_delay;
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let Some(gateway) = weak.upgrade() else {
                return;
            };
            if let Err(e) = gateway.double_check_orphan().await {
                warn!(code = e.error_code(), error = %e, "Orphan double check failed");
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        Ok(())
    }

    /// Second phase: re-filter staging against a fresh handle snapshot
    pub async fn double_check_orphan(&self) -> ServiceResult<OrphanSet> {
        let known = self.directory.fetch_handles().await.map_err(|e| {
            warn!(error = %e, "Cannot fetch handles for orphan double check");
            ServiceError::with_arg(codes::ORPHAN_CHECK_FAILED, e.to_string())
        })?;
        self.provisioner.double_check_orphan(&known)
    }

    /// Start the refresh, heartbeat and (when configured) orphan loops
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_refresh_loop());
        tasks.push(self.spawn_heartbeat_loop());
        if let Some(every) = self.settings.orphan_check_interval {
            tasks.push(self.spawn_orphan_loop(every));
        }
        info!(
            label = %self.settings.label,
            request_timeout_ms = self.settings.request_timeout.as_millis() as u64,
            orphan_check = self.settings.orphan_check_interval.is_some(),
            "Gateway started"
        );
    }

    /// Stop background work and tell the directory the offering is inactive
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Err(e) = self.send_heartbeat(false).await {
            warn!(error = %e, "Deactivation heartbeat failed");
        }
        info!("Gateway stopped");
    }

    fn spawn_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = self.settings.handle_refresh_interval;
        spawn_periodic(weak, every, |gateway| async move {
            if let Err(e) = gateway.refresh_handles().await {
                warn!(error = %e, "Handle refresh failed");
            }
        })
    }

    fn spawn_heartbeat_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = self.settings.heartbeat_interval;
        spawn_periodic(weak, every, |gateway| async move {
            if let Err(e) = gateway.send_heartbeat(true).await {
                warn!(error = %e, "Heartbeat failed");
            }
        })
    }

    fn spawn_orphan_loop(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick is immediate; the first cycle waits a full period
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(gateway) = weak.upgrade() else {
                    break;
                };
                if !gateway.handles_loaded() {
                    debug!("Handles not loaded, orphan check skipped");
                    continue;
                }
                if let Err(e) = gateway.check_orphan(None).await {
                    warn!(code = e.error_code(), error = %e, "Periodic orphan check failed");
                }
            }
        })
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Run `tick` immediately and then every `every` while the gateway lives
fn spawn_periodic<F, Fut>(weak: Weak<Gateway>, every: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn(Arc<Gateway>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(gateway) = weak.upgrade() else {
                break;
            };
            tick(gateway).await;
        }
    })
}
