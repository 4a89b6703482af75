//! # Message Bus
//!
//! ## Purpose
//!
//! Leaf transport of the broker: subject-routed publish/subscribe, a
//! correlated request/reply helper that always pairs the reply subscription
//! with a deadline, and the [`Barrier`] used to aggregate multi-node
//! responses.
//!
//! ## Architecture Role
//!
//! ```text
//! gateway ──► provisioner ──request──► [MessageBus] ──► node
//!                  ▲                        │
//!                  └──────reply / report────┘
//!
//! MessageBus
//!   ├── LocalBus    in-process (single binary, tests)
//!   └── RelayBus    TCP client of RelayServer (bus_relay binary)
//! ```
//!
//! ## Delivery Guarantees
//! - At-most-once, fire-and-forget publish
//! - Per-subscription arrival order; no ordering across publishers
//! - `request` replies are consumed at most once

pub mod barrier;
pub mod bus;
pub mod error;
pub mod local;
pub mod relay;
pub mod request;
pub mod subject;

mod registry;

pub use barrier::{Barrier, BarrierConfig};
pub use bus::{BusMessage, MessageBus, Subscription, SubscriptionId, INBOX_PREFIX};
pub use error::{BusError, Result};
pub use local::{LocalBus, DEFAULT_MAX_PAYLOAD};
pub use relay::{RelayBus, RelayServer};
pub use request::PendingRequest;
