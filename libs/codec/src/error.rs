//! Codec errors
//!
//! Encoding and decoding failures carry the envelope kind so a malformed
//! payload can be traced back to the subject it arrived on.

use thiserror::Error;
use types::ServiceError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Envelope could not be serialized
    #[error("Failed to encode {kind}: {reason}")]
    Encode { kind: &'static str, reason: String },

    /// Payload is not a valid envelope of the expected kind
    #[error("Failed to decode {kind}: {reason}")]
    Decode { kind: &'static str, reason: String },
}

impl CodecError {
    pub fn encode(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Encode {
            kind,
            reason: reason.into(),
        }
    }

    pub fn decode(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            kind,
            reason: reason.into(),
        }
    }
}

/// Undecodable requests surface as `MALFORMATTED_REQ`, everything else as an
/// internal error.
impl From<CodecError> for ServiceError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Decode { .. } => ServiceError::malformatted_request(),
            CodecError::Encode { .. } => ServiceError::internal(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
