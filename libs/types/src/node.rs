//! Node announcement record

use serde::{Deserialize, Serialize};

/// What a node tells the broker about itself.
///
/// `available_capacity` is signed: plans that allow over-provisioning can
/// drive it below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAnnouncement {
    pub id: String,
    pub plan: String,
    pub available_capacity: i64,
    #[serde(default = "default_capacity_unit")]
    pub capacity_unit: u64,
    #[serde(default)]
    pub supported_versions: Vec<String>,
}

fn default_capacity_unit() -> u64 {
    1
}

impl NodeAnnouncement {
    pub fn new(id: impl Into<String>, plan: impl Into<String>, available_capacity: i64) -> Self {
        Self {
            id: id.into(),
            plan: plan.into(),
            available_capacity,
            capacity_unit: 1,
            supported_versions: Vec::new(),
        }
    }

    pub fn with_capacity_unit(mut self, unit: u64) -> Self {
        self.capacity_unit = unit;
        self
    }

    pub fn with_versions(mut self, versions: Vec<String>) -> Self {
        self.supported_versions = versions;
        self
    }

    /// Whether the node serves `version`; nodes that list nothing serve any
    pub fn supports_version(&self, version: Option<&str>) -> bool {
        match version {
            Some(version) if !self.supported_versions.is_empty() => {
                self.supported_versions.iter().any(|v| v == version)
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_unit_defaults_to_one() {
        let raw = r#"{"id":"n1","plan":"free","available_capacity":5}"#;
        let ann: NodeAnnouncement = serde_json::from_str(raw).unwrap();
        assert_eq!(ann.capacity_unit, 1);
        assert!(ann.supported_versions.is_empty());
    }

    #[test]
    fn test_version_support() {
        let ann = NodeAnnouncement::new("n1", "free", 1).with_versions(vec!["1.0".into()]);
        assert!(ann.supports_version(Some("1.0")));
        assert!(!ann.supports_version(Some("2.0")));
        assert!(ann.supports_version(None));
        assert!(NodeAnnouncement::new("n2", "free", 1).supports_version(Some("9")));
    }
}
