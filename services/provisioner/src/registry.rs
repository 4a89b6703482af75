//! Live node registry
//!
//! Populated from announcements; one entry per node id, refreshed on every
//! announcement and evicted once older than the TTL.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use types::NodeAnnouncement;

#[derive(Debug, Clone)]
struct Entry {
    announcement: NodeAnnouncement,
    seen_at: Instant,
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Entry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a node; returns true for a node not seen before
    pub fn upsert(&mut self, announcement: NodeAnnouncement, now: Instant) -> bool {
        let id = announcement.id.clone();
        self.nodes
            .insert(
                id,
                Entry {
                    announcement,
                    seen_at: now,
                },
            )
            .is_none()
    }

    /// Drop entries not refreshed within `ttl`; returns the evicted ids
    pub fn sweep(&mut self, ttl: Duration, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.seen_at) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.nodes.remove(id);
        }
        expired
    }

    /// Nodes refreshed within `ttl`
    pub fn live_count(&self, ttl: Duration, now: Instant) -> usize {
        self.nodes
            .values()
            .filter(|entry| now.saturating_duration_since(entry.seen_at) <= ttl)
            .count()
    }

    /// Live nodes serving `plan`; the only ones that answer its discover
    pub fn live_count_for_plan(&self, plan: &str, ttl: Duration, now: Instant) -> usize {
        self.nodes
            .values()
            .filter(|entry| entry.announcement.plan == plan)
            .filter(|entry| now.saturating_duration_since(entry.seen_at) <= ttl)
            .count()
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeAnnouncement> {
        self.nodes.get(node_id).map(|entry| &entry.announcement)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_one_entry_per_id() {
        let mut registry = NodeRegistry::new();
        let now = Instant::now();
        assert!(registry.upsert(NodeAnnouncement::new("n1", "free", 5), now));
        assert!(!registry.upsert(NodeAnnouncement::new("n1", "free", 4), now));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("n1").unwrap().available_capacity, 4);
    }

    #[test]
    fn test_sweep_evicts_stale_nodes() {
        let mut registry = NodeRegistry::new();
        let start = Instant::now();
        registry.upsert(NodeAnnouncement::new("old", "free", 1), start);
        registry.upsert(NodeAnnouncement::new("fresh", "free", 1), start + Duration::from_secs(200));

        let later = start + Duration::from_secs(301);
        assert_eq!(registry.live_count(Duration::from_secs(300), later), 1);
        assert_eq!(registry.sweep(Duration::from_secs(300), later), vec!["old".to_string()]);
        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some());
    }

    #[test]
    fn test_live_count_for_plan_ignores_other_plans() {
        let mut registry = NodeRegistry::new();
        let now = Instant::now();
        registry.upsert(NodeAnnouncement::new("n1", "free", 5), now);
        registry.upsert(NodeAnnouncement::new("n2", "gold", 5), now);
        registry.upsert(NodeAnnouncement::new("n3", "free", 0), now);

        let ttl = Duration::from_secs(300);
        assert_eq!(registry.live_count(ttl, now), 3);
        assert_eq!(registry.live_count_for_plan("free", ttl, now), 2);
        assert_eq!(registry.live_count_for_plan("gold", ttl, now), 1);
        assert_eq!(registry.live_count_for_plan("silver", ttl, now), 0);
    }
}
