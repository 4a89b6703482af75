//! Service Error Registry
//!
//! Fixed registry of broker error codes grouped by HTTP status class. A
//! [`ServiceError`] is immutable once built and is the only error shape that
//! nodes put on the bus and the gateway puts on the wire.
//!
//! Wire shape (`ErrorResponse`):
//!
//! ```json
//! { "status": 404, "msg": { "code": 30300, "description": "instance-1 not found" } }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP status values used by the registry
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_AUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const INTERNAL: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 501;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    pub const GATEWAY_TIMEOUT: u16 = 504;
}

/// One registry entry: stable numeric code, HTTP status and message template.
///
/// Templates may carry a single `{0}` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: u32,
    pub http_status: u16,
    pub template: &'static str,
}

/// The registry. Codes are stable across the system.
pub mod codes {
    use super::{status, ErrorCode};

    // 400
    pub const INVALID_CONTENT: ErrorCode = ErrorCode {
        code: 30000,
        http_status: status::BAD_REQUEST,
        template: "Invalid Content-Type",
    };
    pub const MALFORMATTED_REQ: ErrorCode = ErrorCode {
        code: 30001,
        http_status: status::BAD_REQUEST,
        template: "Malformatted request",
    };
    pub const UNKNOWN_LABEL: ErrorCode = ErrorCode {
        code: 30002,
        http_status: status::BAD_REQUEST,
        template: "Unknown label",
    };
    pub const UNKNOWN_PLAN: ErrorCode = ErrorCode {
        code: 30003,
        http_status: status::BAD_REQUEST,
        template: "Unknown plan {0}",
    };
    pub const UNKNOWN_ACTION: ErrorCode = ErrorCode {
        code: 30004,
        http_status: status::BAD_REQUEST,
        template: "Unknown migration action {0}",
    };

    // 401 / 403
    pub const NOT_AUTHORIZED: ErrorCode = ErrorCode {
        code: 30100,
        http_status: status::NOT_AUTHORIZED,
        template: "Not authorized",
    };
    pub const FORBIDDEN: ErrorCode = ErrorCode {
        code: 30200,
        http_status: status::FORBIDDEN,
        template: "Forbidden",
    };

    // 404
    pub const NOT_FOUND: ErrorCode = ErrorCode {
        code: 30300,
        http_status: status::NOT_FOUND,
        template: "{0} not found",
    };

    // 405
    pub const METHOD_NOT_ALLOWED: ErrorCode = ErrorCode {
        code: 30400,
        http_status: status::METHOD_NOT_ALLOWED,
        template: "Method not allowed",
    };

    // 500 / 501
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode {
        code: 30500,
        http_status: status::INTERNAL,
        template: "Internal Error",
    };
    pub const NOT_IMPLEMENTED: ErrorCode = ErrorCode {
        code: 30501,
        http_status: status::NOT_IMPLEMENTED,
        template: "Service extension {0} is not implemented",
    };

    // 503
    pub const SERVICE_UNAVAILABLE: ErrorCode = ErrorCode {
        code: 30600,
        http_status: status::SERVICE_UNAVAILABLE,
        template: "Service unavailable",
    };
    pub const NO_NODE_AVAILABLE: ErrorCode = ErrorCode {
        code: 30601,
        http_status: status::SERVICE_UNAVAILABLE,
        template: "No node available for plan {0}",
    };
    pub const HANDLES_NOT_LOADED: ErrorCode = ErrorCode {
        code: 30602,
        http_status: status::SERVICE_UNAVAILABLE,
        template: "Service handles not yet loaded",
    };
    pub const ORPHAN_CHECK_FAILED: ErrorCode = ErrorCode {
        code: 30603,
        http_status: status::SERVICE_UNAVAILABLE,
        template: "Orphan check failed: {0}",
    };

    // 504
    pub const GATEWAY_TIMEOUT: ErrorCode = ErrorCode {
        code: 30700,
        http_status: status::GATEWAY_TIMEOUT,
        template: "Gateway timeout",
    };

    /// Every registry entry, used to recover templates from wire codes
    pub const ALL: &[ErrorCode] = &[
        INVALID_CONTENT,
        MALFORMATTED_REQ,
        UNKNOWN_LABEL,
        UNKNOWN_PLAN,
        UNKNOWN_ACTION,
        NOT_AUTHORIZED,
        FORBIDDEN,
        NOT_FOUND,
        METHOD_NOT_ALLOWED,
        INTERNAL_ERROR,
        NOT_IMPLEMENTED,
        SERVICE_UNAVAILABLE,
        NO_NODE_AVAILABLE,
        HANDLES_NOT_LOADED,
        ORPHAN_CHECK_FAILED,
        GATEWAY_TIMEOUT,
    ];

    /// Look up a registry entry by numeric code
    pub fn lookup(code: u32) -> Option<ErrorCode> {
        ALL.iter().copied().find(|entry| entry.code == code)
    }
}

impl ErrorCode {
    /// Render the template, substituting `{0}` with `arg`
    pub fn render(&self, arg: Option<&str>) -> String {
        match arg {
            Some(arg) => self.template.replace("{0}", arg),
            None => self.template.replace("{0}", "").trim().to_string(),
        }
    }
}

/// Structured broker error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {error_code}, status {http_status})")]
pub struct ServiceError {
    error_code: u32,
    http_status: u16,
    message: String,
}

/// Result alias for broker workflows
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// `msg` part of the wire error; also the HTTP error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u32,
    pub description: String,
}

/// Wire error envelope carried by failed bus replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub msg: ErrorBody,
}

impl ServiceError {
    /// Build from a registry entry without a template argument
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error_code: code.code,
            http_status: code.http_status,
            message: code.render(None),
        }
    }

    /// Build from a registry entry, filling the `{0}` placeholder
    pub fn with_arg(code: ErrorCode, arg: impl AsRef<str>) -> Self {
        Self {
            error_code: code.code,
            http_status: code.http_status,
            message: code.render(Some(arg.as_ref())),
        }
    }

    pub fn internal() -> Self {
        Self::new(codes::INTERNAL_ERROR)
    }

    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::with_arg(codes::NOT_FOUND, what)
    }

    pub fn not_implemented(extension: impl AsRef<str>) -> Self {
        Self::with_arg(codes::NOT_IMPLEMENTED, extension)
    }

    pub fn service_unavailable() -> Self {
        Self::new(codes::SERVICE_UNAVAILABLE)
    }

    pub fn gateway_timeout() -> Self {
        Self::new(codes::GATEWAY_TIMEOUT)
    }

    pub fn malformatted_request() -> Self {
        Self::new(codes::MALFORMATTED_REQ)
    }

    pub fn error_code(&self) -> u32 {
        self.error_code
    }

    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error was built from `code`
    pub fn is(&self, code: ErrorCode) -> bool {
        self.error_code == code.code
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: self.http_status,
            msg: self.body(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.error_code,
            description: self.message.clone(),
        }
    }
}

impl From<ErrorResponse> for ServiceError {
    fn from(response: ErrorResponse) -> Self {
        Self {
            error_code: response.msg.code,
            http_status: response.status,
            message: response.msg.description,
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        err.to_response()
    }
}
