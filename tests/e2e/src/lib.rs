//! End-to-end test framework for the service broker
//!
//! Wires real nodes, a provisioner and optionally a gateway onto one bus so
//! scenarios exercise the full request path: HTTP → provisioner → bus →
//! node → driver and back.

pub mod fixtures;

pub use fixtures::{init_test_logging, settle, TestBroker, TestNode};
