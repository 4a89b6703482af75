//! # Bus Error Types
//!
//! Transport-level failures. None of these cross the bus themselves; callers
//! translate them into a `ServiceError` at the workflow boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    /// Subject or pattern is not well formed
    #[error("Invalid subject '{subject}': {reason}")]
    InvalidSubject { subject: String, reason: String },

    /// Payload exceeds the configured maximum message size
    #[error("Payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// No reply arrived before the deadline
    #[error("Request to '{subject}' timed out")]
    Timeout { subject: String },

    /// The bus or subscription has shut down
    #[error("Bus closed: {0}")]
    Closed(String),

    /// Barrier constructed with neither timeout nor callback count
    #[error("Invalid barrier configuration: {0}")]
    InvalidBarrier(String),

    /// Relay frame could not be encoded or decoded
    #[error("Frame error: {0}")]
    Frame(String),

    /// Transport layer errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    pub fn invalid_subject(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSubject {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(subject: impl Into<String>) -> Self {
        Self::Timeout {
            subject: subject.into(),
        }
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<bincode::Error> for BusError {
    fn from(err: bincode::Error) -> Self {
        BusError::Frame(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
