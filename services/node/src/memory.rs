//! In-memory reference driver
//!
//! Keeps instances and bindings in a map and hands out generated
//! credentials. Backs the `node` binary's demo mode and every test that needs
//! a real node.

use crate::driver::ResourceDriver;
use anyhow::anyhow;
use async_trait::async_trait;
use codec::UpdatedInstance;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use types::credentials::{NAME, NODE_ID, USER};
use types::{Credentials, ServiceError};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct InstanceRecord {
    plan: Option<String>,
    credentials: Credentials,
    bindings: Vec<Credentials>,
    enabled: bool,
    restored_from: Option<String>,
}

pub struct MemoryDriver {
    node_id: String,
    capacity_unit: u64,
    instance_limit: Option<usize>,
    ready: AtomicBool,
    instances: Mutex<BTreeMap<String, InstanceRecord>>,
}

fn token() -> String {
    Uuid::new_v4().simple().to_string()
}

impl MemoryDriver {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            capacity_unit: 1,
            instance_limit: None,
            ready: AtomicBool::new(true),
            instances: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_capacity_unit(mut self, unit: u64) -> Self {
        self.capacity_unit = unit;
        self
    }

    /// Fail provisioning with a raw (non-service) error past `limit`
    pub fn with_instance_limit(mut self, limit: usize) -> Self {
        self.instance_limit = Some(limit);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Place an instance on the node without going through the broker
    pub fn adopt_instance(&self, instance_id: &str) {
        let credentials = self.instance_credentials(instance_id);
        self.instances.lock().insert(
            instance_id.to_string(),
            InstanceRecord {
                plan: None,
                credentials,
                bindings: Vec::new(),
                enabled: true,
                restored_from: None,
            },
        );
    }

    /// Place a binding on an existing instance without going through the broker
    pub fn adopt_binding(&self, credentials: Credentials) -> bool {
        let Some(name) = credentials.name().map(str::to_string) else {
            return false;
        };
        match self.instances.lock().get_mut(&name) {
            Some(record) => {
                record.bindings.push(credentials);
                true
            }
            None => false,
        }
    }

    pub fn has_instance(&self, instance_id: &str) -> bool {
        self.instances.lock().contains_key(instance_id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn binding_count(&self) -> usize {
        self.instances.lock().values().map(|r| r.bindings.len()).sum()
    }

    pub fn is_enabled(&self, instance_id: &str) -> Option<bool> {
        self.instances.lock().get(instance_id).map(|r| r.enabled)
    }

    pub fn restored_from(&self, instance_id: &str) -> Option<String> {
        self.instances
            .lock()
            .get(instance_id)
            .and_then(|r| r.restored_from.clone())
    }

    fn instance_credentials(&self, name: &str) -> Credentials {
        Credentials::new()
            .with(NAME, name)
            .with(NODE_ID, self.node_id.as_str())
            .with("host", "127.0.0.1")
            .with("password", token())
    }
}

#[async_trait]
impl ResourceDriver for MemoryDriver {
    async fn provision(
        &self,
        plan: &str,
        _version: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Credentials> {
        let mut instances = self.instances.lock();
        if let Some(limit) = self.instance_limit {
            if instances.len() >= limit {
                return Err(anyhow!("instance limit {} reached on {}", limit, self.node_id));
            }
        }

        let name = credentials
            .and_then(Credentials::name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("inst-{}", token()));
        if instances.contains_key(&name) {
            return Err(anyhow!("instance {} already exists", name));
        }

        let mut issued = self.instance_credentials(&name);
        if let Some(prior) = credentials {
            issued.merge(prior);
            issued.insert(NODE_ID, self.node_id.as_str());
        }

        instances.insert(
            name,
            InstanceRecord {
                plan: Some(plan.to_string()),
                credentials: issued.clone(),
                bindings: Vec::new(),
                enabled: true,
                restored_from: None,
            },
        );
        Ok(issued)
    }

    async fn unprovision(&self, name: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        match self.instances.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(ServiceError::not_found(name).into()),
        }
    }

    async fn bind(
        &self,
        name: &str,
        _bind_opts: &Value,
        credentials: Option<&Credentials>,
    ) -> anyhow::Result<Credentials> {
        let mut instances = self.instances.lock();
        let record = instances
            .get_mut(name)
            .ok_or_else(|| ServiceError::not_found(name))?;

        let binding = match credentials {
            Some(prior) => {
                let mut binding = prior.clone();
                binding.insert(NAME, name);
                binding.insert(NODE_ID, self.node_id.as_str());
                binding
            }
            None => Credentials::new()
                .with(NAME, name)
                .with(NODE_ID, self.node_id.as_str())
                .with("host", "127.0.0.1")
                .with(USER, format!("u{}", &token()[..12]))
                .with("password", token()),
        };
        record.bindings.push(binding.clone());
        Ok(binding)
    }

    async fn unbind(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let name = credentials
            .name()
            .ok_or_else(|| ServiceError::malformatted_request())?;
        let mut instances = self.instances.lock();
        let record = instances
            .get_mut(name)
            .ok_or_else(|| ServiceError::not_found(name))?;
        let before = record.bindings.len();
        record.bindings.retain(|b| !b.same_binding(credentials));
        if record.bindings.len() == before {
            return Err(ServiceError::not_found(credentials.user().unwrap_or(name)).into());
        }
        Ok(())
    }

    async fn restore(&self, instance_id: &str, backup_path: &str) -> anyhow::Result<()> {
        let mut instances = self.instances.lock();
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| ServiceError::not_found(instance_id))?;
        record.restored_from = Some(backup_path.to_string());
        Ok(())
    }

    async fn disable_instance(&self, instance_id: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        self.set_enabled(instance_id, false)
    }

    async fn enable_instance(&self, instance_id: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        self.set_enabled(instance_id, true)
    }

    async fn import_instance(
        &self,
        instance_id: &str,
        plan: Option<&str>,
        bindings: &[Credentials],
    ) -> anyhow::Result<()> {
        let mut instances = self.instances.lock();
        if instances.contains_key(instance_id) {
            return Err(anyhow!("instance {} already exists", instance_id));
        }
        let credentials = self.instance_credentials(instance_id);
        instances.insert(
            instance_id.to_string(),
            InstanceRecord {
                plan: plan.map(str::to_string),
                credentials,
                bindings: bindings.to_vec(),
                enabled: true,
                restored_from: None,
            },
        );
        Ok(())
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        _bindings: &[Credentials],
    ) -> anyhow::Result<UpdatedInstance> {
        let mut instances = self.instances.lock();
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| ServiceError::not_found(instance_id))?;
        record.credentials.insert(NODE_ID, self.node_id.as_str());
        for binding in record.bindings.iter_mut() {
            binding.insert(NODE_ID, self.node_id.as_str());
        }
        Ok(UpdatedInstance {
            instance: record.credentials.clone(),
            bindings: record.bindings.clone(),
        })
    }

    async fn cleanup_nfs_instance(&self, instance_id: &str, _bindings: &[Credentials]) -> anyhow::Result<()> {
        if self.has_instance(instance_id) {
            Ok(())
        } else {
            Err(ServiceError::not_found(instance_id).into())
        }
    }

    async fn all_instances_list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.instances.lock().keys().cloned().collect())
    }

    async fn all_bindings_list(&self) -> anyhow::Result<Vec<Credentials>> {
        Ok(self
            .instances
            .lock()
            .values()
            .flat_map(|r| r.bindings.iter().cloned())
            .collect())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn capacity_unit(&self) -> u64 {
        self.capacity_unit
    }
}

impl MemoryDriver {
    fn set_enabled(&self, instance_id: &str, enabled: bool) -> anyhow::Result<()> {
        let mut instances = self.instances.lock();
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| ServiceError::not_found(instance_id))?;
        record.enabled = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_provision_bind_unbind_unprovision() {
        let driver = MemoryDriver::new("n1");
        let creds = driver.provision("free", None, None).await.unwrap();
        let name = creds.name().unwrap().to_string();
        assert_eq!(creds.node_id(), Some("n1"));

        let binding = driver.bind(&name, &json!({}), None).await.unwrap();
        assert_eq!(binding.name(), Some(name.as_str()));
        assert!(binding.user().is_some());
        assert_eq!(driver.binding_count(), 1);

        driver.unbind(&binding).await.unwrap();
        assert!(driver.unbind(&binding).await.is_err());

        driver.unprovision(&name, &[]).await.unwrap();
        assert!(!driver.has_instance(&name));
    }

    #[tokio::test]
    async fn test_provision_reuses_prior_identity() {
        let driver = MemoryDriver::new("n2");
        let prior = Credentials::new()
            .with(NAME, "db-7")
            .with(NODE_ID, "n1")
            .with("password", "keep");
        let creds = driver.provision("free", None, Some(&prior)).await.unwrap();
        assert_eq!(creds.name(), Some("db-7"));
        assert_eq!(creds.node_id(), Some("n2"));
        assert_eq!(creds.get_str("password"), Some("keep"));
    }

    #[tokio::test]
    async fn test_instance_limit_raises_raw_error() {
        let driver = MemoryDriver::new("n1").with_instance_limit(0);
        let err = driver.provision("free", None, None).await.unwrap_err();
        assert!(err.downcast_ref::<ServiceError>().is_none());
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let driver = MemoryDriver::new("n1");
        let err = driver.restore("missing", "/backups/x").await.unwrap_err();
        assert!(err.downcast_ref::<ServiceError>().is_some());
    }
}
