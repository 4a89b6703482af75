//! # Node Agent
//!
//! One node process fronts one backing resource. The agent owns the bus side
//! (subjects, replies, announcements, capacity accounting) and delegates every
//! resource operation to a [`ResourceDriver`].
//!
//! ```rust,no_run
//! use message_bus::LocalBus;
//! use node::{MemoryDriver, Node, NodeSettings};
//! use std::sync::Arc;
//!
//! # async fn run() -> node::Result<()> {
//! let bus = Arc::new(LocalBus::default());
//! let node = Node::new(bus, Arc::new(MemoryDriver::new("n1")), NodeSettings::new("n1", "free"));
//! node.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod error;
pub mod memory;
pub mod node;

pub use driver::{to_service_error, ResourceDriver};
pub use error::{NodeError, Result};
pub use memory::MemoryDriver;
pub use node::{Node, NodeSettings};
