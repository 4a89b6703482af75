//! Orphan sets
//!
//! Reconciliation runs in two passes. Node reports are filtered against the
//! handle snapshot taken before the broadcast and staged per node; the staged
//! entries are then filtered again against a later snapshot. Only entries
//! missing from both snapshots survive into the final set.

use crate::credentials::Credentials;
use crate::handle::ProvisionedServiceHandle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Lookup index over a known-handle list
#[derive(Debug, Clone, Default)]
pub struct KnownHandles {
    instance_ids: HashSet<String>,
    bindings: Vec<Credentials>,
}

impl KnownHandles {
    pub fn new(handles: &[ProvisionedServiceHandle]) -> Self {
        let mut known = Self::default();
        for handle in handles {
            if handle.is_binding() {
                known.bindings.push(handle.credentials.clone());
            } else {
                known.instance_ids.insert(handle.service_id.clone());
            }
        }
        known
    }

    pub fn contains_instance(&self, instance_id: &str) -> bool {
        self.instance_ids.contains(instance_id)
    }

    pub fn contains_binding(&self, credentials: &Credentials) -> bool {
        self.bindings.iter().any(|known| known.same_binding(credentials))
    }

    pub fn len(&self) -> usize {
        self.instance_ids.len() + self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-node orphan instance ids and binding descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanSet {
    #[serde(default)]
    pub instances: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub bindings: BTreeMap<String, Vec<Credentials>>,
}

impl OrphanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one node report, keeping only entries absent from `known`.
    ///
    /// Nodes without orphans get no entry. Entries already staged are not
    /// duplicated.
    pub fn stage_report(
        &mut self,
        node_id: &str,
        instances: &[String],
        bindings: &[Credentials],
        known: &KnownHandles,
    ) {
        for instance_id in instances {
            if known.contains_instance(instance_id) {
                continue;
            }
            let staged = self.instances.entry(node_id.to_string()).or_default();
            if !staged.contains(instance_id) {
                staged.push(instance_id.clone());
            }
        }

        for binding in bindings {
            if known.contains_binding(binding) {
                continue;
            }
            let staged = self.bindings.entry(node_id.to_string()).or_default();
            if !staged.iter().any(|b| b.same_binding(binding)) {
                staged.push(binding.clone());
            }
        }
    }

    /// Entries of `self` still absent from `known`
    pub fn refilter(&self, known: &KnownHandles) -> OrphanSet {
        let mut survivors = OrphanSet::new();
        for (node_id, ids) in &self.instances {
            let remaining: Vec<String> = ids
                .iter()
                .filter(|id| !known.contains_instance(id))
                .cloned()
                .collect();
            if !remaining.is_empty() {
                survivors.instances.insert(node_id.clone(), remaining);
            }
        }
        for (node_id, creds) in &self.bindings {
            let remaining: Vec<Credentials> = creds
                .iter()
                .filter(|c| !known.contains_binding(c))
                .cloned()
                .collect();
            if !remaining.is_empty() {
                survivors.bindings.insert(node_id.clone(), remaining);
            }
        }
        survivors
    }

    pub fn instance_count(&self) -> usize {
        self.instances.values().map(Vec::len).sum()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_count() == 0 && self.binding_count() == 0
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{NAME, NODE_ID, USER};
    use proptest::prelude::*;
    use serde_json::json;

    fn instance(id: &str) -> ProvisionedServiceHandle {
        ProvisionedServiceHandle::instance(
            id,
            "free",
            None,
            Credentials::new().with(NAME, id).with(NODE_ID, "n1"),
        )
    }

    fn binding_creds(instance: &str, user: &str) -> Credentials {
        Credentials::new().with(NAME, instance).with(USER, user)
    }

    fn binding(id: &str, instance: &str, user: &str) -> ProvisionedServiceHandle {
        ProvisionedServiceHandle::binding(id, Some("free"), json!({}), binding_creds(instance, user))
    }

    #[test]
    fn test_stage_filters_known_handles() {
        let known = KnownHandles::new(&[instance("a"), binding("b1", "a", "u1")]);
        let mut set = OrphanSet::new();
        set.stage_report(
            "n1",
            &["a".into(), "x".into()],
            &[binding_creds("a", "u1"), binding_creds("x", "u9")],
            &known,
        );
        assert_eq!(set.instances.get("n1"), Some(&vec!["x".to_string()]));
        assert_eq!(set.bindings.get("n1").map(Vec::len), Some(1));
    }

    #[test]
    fn test_node_with_no_orphans_has_no_entry() {
        let known = KnownHandles::new(&[instance("a")]);
        let mut set = OrphanSet::new();
        set.stage_report("n1", &["a".into()], &[], &known);
        set.stage_report("n2", &[], &[], &known);
        assert!(set.is_empty());
        assert!(set.instances.is_empty());
    }

    #[test]
    fn test_duplicate_reports_do_not_duplicate_entries() {
        let known = KnownHandles::default();
        let mut set = OrphanSet::new();
        set.stage_report("n1", &["x".into()], &[binding_creds("x", "u")], &known);
        set.stage_report("n1", &["x".into()], &[binding_creds("x", "u")], &known);
        assert_eq!(set.instance_count(), 1);
        assert_eq!(set.binding_count(), 1);
    }

    #[test]
    fn test_refilter_drops_handles_created_between_snapshots() {
        let mut staging = OrphanSet::new();
        staging.stage_report("n1", &["new".into(), "gone".into()], &[], &KnownHandles::default());
        let later = KnownHandles::new(&[instance("new")]);
        let final_set = staging.refilter(&later);
        assert_eq!(final_set.instances.get("n1"), Some(&vec!["gone".to_string()]));
    }

    proptest! {
        #[test]
        fn prop_final_orphan_iff_absent_from_both_snapshots(
            reported in proptest::collection::hash_set("[a-f]{1,2}", 0..20),
            first in proptest::collection::hash_set("[a-f]{1,2}", 0..20),
            second in proptest::collection::hash_set("[a-f]{1,2}", 0..20),
        ) {
            let first_handles: Vec<_> = first.iter().map(|id| instance(id)).collect();
            let second_handles: Vec<_> = second.iter().map(|id| instance(id)).collect();
            let reported: Vec<String> = reported.into_iter().collect();

            let mut staging = OrphanSet::new();
            staging.stage_report("n1", &reported, &[], &KnownHandles::new(&first_handles));
            let final_set = staging.refilter(&KnownHandles::new(&second_handles));
            let finals: Vec<String> = final_set.instances.get("n1").cloned().unwrap_or_default();

            for id in &reported {
                let expected = !first.contains(id) && !second.contains(id);
                prop_assert_eq!(finals.contains(id), expected);
            }
        }
    }
}
