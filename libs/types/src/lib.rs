//! # Service Broker Types
//!
//! Shared data model for the broker: the node announcement record, the
//! provisioned-service handle cached by the provisioner, the staged orphan
//! sets produced by reconciliation, and the [`ServiceError`] registry that is
//! the only error allowed to cross the bus or the HTTP boundary.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/messaging/bus
//!     ↑             ↓               ↓
//! Pure data    Wire envelopes   Transport
//! Handles      Subjects         Request/reply
//! ServiceError Chunking         Barrier
//! ```
//!
//! Nothing in this crate performs I/O; everything here is plain data that
//! the node, provisioner and gateway services pass around.

pub mod credentials;
pub mod error;
pub mod handle;
pub mod node;
pub mod orphan;

pub use credentials::Credentials;
pub use error::{codes, ErrorBody, ErrorCode, ErrorResponse, ServiceError, ServiceResult};
pub use handle::ProvisionedServiceHandle;
pub use node::NodeAnnouncement;
pub use orphan::{KnownHandles, OrphanSet};
