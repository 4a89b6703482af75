//! # Async Service Gateway
//!
//! ## Purpose
//!
//! HTTP front of the broker. Authenticates and validates requests, runs the
//! matching provisioner workflow under a request timeout, and keeps the
//! provisioner's handle cache in step with the upstream directory.
//!
//! ## Architecture Role
//!
//! ```text
//!  directory ◄── heartbeat / handle refresh ──┐
//!      │                                      │
//!      ▼                                      │
//! HTTP client ──► [routes] ──► [Gateway] ─────┘
//!                                  │ execute(work, request_timeout)
//!                                  ▼
//!                             Provisioner ──► message bus ──► nodes
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use gateway::{routes, Gateway, GatewaySettings, MemoryDirectory};
//! use message_bus::LocalBus;
//! use provisioner::{Provisioner, ProvisionerSettings};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let bus = Arc::new(LocalBus::default());
//! let provisioner = Arc::new(Provisioner::new(bus, ProvisionerSettings::new("kv")));
//! provisioner.start().await?;
//!
//! let settings = GatewaySettings::new("kv-1.0", "changeme");
//! let addr = settings.socket_addr()?;
//! let gateway = Arc::new(Gateway::new(provisioner, Arc::new(MemoryDirectory::new()), settings));
//! gateway.start();
//! warp::serve(routes(gateway)).run(addr).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod routes;

pub use config::{GatewaySettings, TOKEN_HEADER};
pub use directory::{DirectoryClient, HandleDirectory, MemoryDirectory};
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use routes::{handle_rejection, routes};
