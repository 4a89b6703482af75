//! Node agent errors

use message_bus::BusError;
use thiserror::Error;

/// Failures that stop the node agent itself. Per-request failures never show
/// up here: they travel back to the provisioner as `ServiceError` replies.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Node startup failed: {message}")]
    Startup { message: String },
}

impl NodeError {
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
