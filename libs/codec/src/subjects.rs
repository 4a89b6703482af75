//! # Subject Naming
//!
//! Every bus subject the broker uses is derived from the service name `S`:
//!
//! ```text
//! per node (N):  S.provision.N  S.unprovision.N  S.bind.N  S.unbind.N
//!                S.restore.N    S.purge_orphan.N
//!                S.disable_instance.N  S.enable_instance.N  S.import_instance.N
//!                S.update_instance.N   S.cleanupnfs_instance.N
//! broadcast:     S.discover  S.check_orphan  S.announce  S.node_handles
//! ```

use std::fmt;
use std::str::FromStr;
use types::{codes, ServiceError};

/// Subject builder for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    service: String,
}

impl Subjects {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn node_verb(&self, verb: &str, node_id: &str) -> String {
        format!("{}.{}.{}", self.service, verb, node_id)
    }

    fn broadcast(&self, verb: &str) -> String {
        format!("{}.{}", self.service, verb)
    }

    pub fn provision(&self, node_id: &str) -> String {
        self.node_verb("provision", node_id)
    }

    pub fn unprovision(&self, node_id: &str) -> String {
        self.node_verb("unprovision", node_id)
    }

    pub fn bind(&self, node_id: &str) -> String {
        self.node_verb("bind", node_id)
    }

    pub fn unbind(&self, node_id: &str) -> String {
        self.node_verb("unbind", node_id)
    }

    pub fn restore(&self, node_id: &str) -> String {
        self.node_verb("restore", node_id)
    }

    pub fn purge_orphan(&self, node_id: &str) -> String {
        self.node_verb("purge_orphan", node_id)
    }

    pub fn migration(&self, action: MigrationAction, node_id: &str) -> String {
        self.node_verb(action.verb(), node_id)
    }

    pub fn discover(&self) -> String {
        self.broadcast("discover")
    }

    pub fn check_orphan(&self) -> String {
        self.broadcast("check_orphan")
    }

    pub fn announce(&self) -> String {
        self.broadcast("announce")
    }

    pub fn node_handles(&self) -> String {
        self.broadcast("node_handles")
    }
}

/// Migration support verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationAction {
    Disable,
    Enable,
    Import,
    Update,
    CleanupNfs,
}

impl MigrationAction {
    pub const ALL: [MigrationAction; 5] = [
        MigrationAction::Disable,
        MigrationAction::Enable,
        MigrationAction::Import,
        MigrationAction::Update,
        MigrationAction::CleanupNfs,
    ];

    /// Action name as it appears in the migration URL
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationAction::Disable => "disable",
            MigrationAction::Enable => "enable",
            MigrationAction::Import => "import",
            MigrationAction::Update => "update",
            MigrationAction::CleanupNfs => "cleanupnfs",
        }
    }

    /// Subject verb
    pub fn verb(&self) -> &'static str {
        match self {
            MigrationAction::Disable => "disable_instance",
            MigrationAction::Enable => "enable_instance",
            MigrationAction::Import => "import_instance",
            MigrationAction::Update => "update_instance",
            MigrationAction::CleanupNfs => "cleanupnfs_instance",
        }
    }
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationAction {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ServiceError::with_arg(codes::UNKNOWN_ACTION, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        let s = Subjects::new("kv");
        assert_eq!(s.provision("n1"), "kv.provision.n1");
        assert_eq!(s.purge_orphan("n1"), "kv.purge_orphan.n1");
        assert_eq!(s.migration(MigrationAction::CleanupNfs, "n1"), "kv.cleanupnfs_instance.n1");
        assert_eq!(s.discover(), "kv.discover");
        assert_eq!(s.node_handles(), "kv.node_handles");
    }

    #[test]
    fn test_migration_action_parse() {
        assert_eq!("import".parse::<MigrationAction>(), Ok(MigrationAction::Import));
        let err = "explode".parse::<MigrationAction>().unwrap_err();
        assert!(err.is(codes::UNKNOWN_ACTION));
        assert_eq!(err.message(), "Unknown migration action explode");
    }
}
