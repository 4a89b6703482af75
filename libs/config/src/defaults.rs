//! Default values shared by the broker services
//!
//! These are the fallbacks used when a section or key is missing from the
//! configuration file and the environment.

/// Service identity defaults
pub mod service {
    pub const NAME: &str = "kv";
    pub const LABEL: &str = "kv-1.0";
    pub const VERSION: &str = "1.0";
    pub const DEFAULT_PLAN: &str = "free";
}

/// Message bus defaults
pub mod bus {
    pub const RELAY_ADDRESS: &str = "127.0.0.1:4222";

    /// Maximum encoded message size (1 MiB)
    pub const MAX_PAYLOAD: usize = 1024 * 1024;
}

/// Provisioner defaults
pub mod provisioner {
    /// Per-request reply deadline for a single node
    pub const NODE_TIMEOUT_MS: u64 = 2_000;

    /// How long discovery waits for announcements
    pub const DISCOVER_TIMEOUT_MS: u64 = 2_000;

    /// Announcements older than this are evicted
    pub const NODE_TTL_SECS: u64 = 300;

    pub const SWEEP_INTERVAL_SECS: u64 = 60;
}

/// Node defaults
pub mod node {
    pub const NODE_ID: &str = "node-0";
    pub const CAPACITY: i64 = 200;
    pub const CAPACITY_UNIT: u64 = 1;
    pub const ANNOUNCE_INTERVAL_SECS: u64 = 30;
}

/// Gateway defaults
pub mod gateway {
    pub const BIND_ADDRESS: &str = "127.0.0.1";
    pub const PORT: u16 = 8181;
    pub const TOKEN: &str = "changeme";
    pub const REQUEST_TIMEOUT_MS: u64 = 5_000;
    pub const DIRECTORY_URI: &str = "http://127.0.0.1:8080";
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 20;
    pub const HANDLE_REFRESH_INTERVAL_SECS: u64 = 60;
    pub const DOUBLE_CHECK_DELAY_SECS: u64 = 300;
}
