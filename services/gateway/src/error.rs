//! Error types for the gateway process
//!
//! Request-level failures are `types::ServiceError` values rendered into
//! HTTP bodies; these variants cover the process plumbing around them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Directory error: {message}")]
    Directory { message: String },

    #[error("Directory client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
