//! Provisioned handle cache
//!
//! Keyed by `service_id`: the node-issued instance name for instances, a
//! broker-generated id for bindings.

use std::collections::HashMap;
use types::ProvisionedServiceHandle;

#[derive(Debug, Default)]
pub struct HandleCache {
    handles: HashMap<String, ProvisionedServiceHandle>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ProvisionedServiceHandle) {
        self.handles.insert(handle.service_id.clone(), handle);
    }

    pub fn get(&self, service_id: &str) -> Option<&ProvisionedServiceHandle> {
        self.handles.get(service_id)
    }

    pub fn remove(&mut self, service_id: &str) -> Option<ProvisionedServiceHandle> {
        self.handles.remove(service_id)
    }

    /// Binding handles whose credentials point at `instance_id`
    pub fn bindings_of(&self, instance_id: &str) -> Vec<ProvisionedServiceHandle> {
        self.handles
            .values()
            .filter(|handle| handle.is_binding_of(instance_id))
            .cloned()
            .collect()
    }

    /// Remove an instance and every binding of it; returns the removed ids
    pub fn evict_instance(&mut self, instance_id: &str) -> Vec<String> {
        let mut removed: Vec<String> = self
            .handles
            .values()
            .filter(|handle| handle.service_id == instance_id || handle.is_binding_of(instance_id))
            .map(|handle| handle.service_id.clone())
            .collect();
        removed.sort();
        for id in &removed {
            self.handles.remove(id);
        }
        removed
    }

    /// Instance (non-binding) ids owned by `node_id`
    pub fn instance_ids_on(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handles
            .values()
            .filter(|handle| !handle.is_binding() && handle.node_id() == Some(node_id))
            .map(|handle| handle.service_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Replace the whole cache with an authoritative list
    pub fn replace_all(&mut self, handles: Vec<ProvisionedServiceHandle>) {
        self.handles = handles
            .into_iter()
            .map(|handle| (handle.service_id.clone(), handle))
            .collect();
    }

    pub fn snapshot(&self) -> Vec<ProvisionedServiceHandle> {
        self.handles.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
