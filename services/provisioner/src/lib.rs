//! # Provisioner
//!
//! Broker core between the gateway and the node fleet: node discovery and
//! scoring, timed node requests, the provisioned-handle cache and the
//! two-phase orphan reconciliation.
//!
//! ```rust,no_run
//! use message_bus::LocalBus;
//! use provisioner::{Provisioner, ProvisionerSettings};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let bus = Arc::new(LocalBus::default());
//! let provisioner = Provisioner::new(bus, ProvisionerSettings::new("kv"));
//! provisioner.start().await?;
//! let handle = provisioner.provision_service("free", None).await?;
//! println!("{}", handle.service_id);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod orphan;
pub mod provisioner;
pub mod registry;
pub mod scoring;
pub mod updater;

pub use cache::HandleCache;
pub use orphan::OrphanTracker;
pub use provisioner::{Provisioner, ProvisionerSettings};
pub use registry::NodeRegistry;
pub use scoring::{select_best, AvailableCapacity, NodeScorer};
pub use updater::{HandleUpdater, LocalOnly};
