//! # Service Message Codec
//!
//! ## Purpose
//!
//! Typed request/response envelopes exchanged between the gateway, the
//! provisioner and the nodes, the subject naming scheme they travel on, and
//! the chunking rule that keeps fan-out payloads under the transport limit.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/messaging/bus
//!     ↑           ↓             ↓
//! Handles     Envelopes     publish/request
//! Errors      Subjects      Barrier
//!             Chunker
//! ```
//!
//! Every reply envelope carries a `success` flag and, on failure, the
//! structured `ErrorResponse` of a [`types::ServiceError`]. Raw errors never
//! cross the bus.
//!
//! ## What This Crate Does NOT Contain
//! - Transport logic (belongs in `message-bus`)
//! - Workflow logic (belongs in the node and provisioner services)

pub mod chunk;
pub mod error;
pub mod gateway;
pub mod message;
pub mod requests;
pub mod subjects;

pub use chunk::{Chunker, ENVELOPE_OVERHEAD, MAX_ITEM_BYTES, MIN_MAX_PAYLOAD};
pub use error::{CodecError, Result};
pub use gateway::{
    CheckOrphanRequest, GatewayBindRequest, GatewayBindResponse, GatewayProvisionRequest,
    GatewayProvisionResponse, GatewayRecoverRequest, GatewayRestoreRequest, GatewayUnbindRequest,
    HandleList, InstanceListResponse, OrphanReport, PurgeOrphanHttpRequest, ServiceOffering,
};
pub use message::{Response, ServiceMessage, SimpleResponse};
pub use requests::{
    Announcement, BindRequest, BindResponse, DiscoverRequest, MigrationRequest, NodeHandlesReport,
    ProvisionRequest, ProvisionResponse, PurgeOrphanRequest, RestoreRequest, UnbindRequest,
    UnprovisionRequest, UpdateInstanceResponse, UpdatedInstance,
};
pub use subjects::{MigrationAction, Subjects};
