//! Envelope trait and the shared reply shapes
//!
//! Every reply carries a `success` flag. Failed replies carry the
//! [`ErrorResponse`] of the `ServiceError` raised on the node, so the error
//! code survives the trip across the bus unchanged.

use crate::error::{CodecError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use types::{ErrorResponse, ServiceError, ServiceResult};

/// A typed envelope with a JSON wire format
pub trait ServiceMessage: Serialize + DeserializeOwned {
    /// Envelope name used in codec errors and logs
    const KIND: &'static str;

    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CodecError::encode(Self::KIND, e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decode(Self::KIND, e.to_string()))
    }
}

/// Reply carrying a payload on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl<T> Response<T> {
    pub fn ok(response: T) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn fail(err: &ServiceError) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(err.to_response()),
        }
    }

    /// A success without a payload is treated as an internal error
    pub fn into_result(self) -> ServiceResult<T> {
        match (self.success, self.response, self.error) {
            (true, Some(response), _) => Ok(response),
            (false, _, Some(error)) => Err(error.into()),
            _ => Err(ServiceError::internal()),
        }
    }
}

impl<T: Serialize + DeserializeOwned> ServiceMessage for Response<T> {
    const KIND: &'static str = "Response";
}

impl<T> From<ServiceResult<T>> for Response<T> {
    fn from(result: ServiceResult<T>) -> Self {
        match result {
            Ok(response) => Self::ok(response),
            Err(err) => Self::fail(&err),
        }
    }
}

/// Reply with no payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl SimpleResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn fail(err: &ServiceError) -> Self {
        Self {
            success: false,
            error: Some(err.to_response()),
        }
    }

    pub fn into_result(self) -> ServiceResult<()> {
        match (self.success, self.error) {
            (true, _) => Ok(()),
            (false, Some(error)) => Err(error.into()),
            (false, None) => Err(ServiceError::internal()),
        }
    }
}

impl From<ServiceResult<()>> for SimpleResponse {
    fn from(result: ServiceResult<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(err) => Self::fail(&err),
        }
    }
}

impl ServiceMessage for SimpleResponse {
    const KIND: &'static str = "SimpleResponse";
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::codes;

    #[test]
    fn test_failed_reply_preserves_error_code() {
        let err = ServiceError::not_found("db-1");
        let wire = SimpleResponse::fail(&err).encode().unwrap();
        let decoded = SimpleResponse::decode(&wire).unwrap();
        assert_eq!(decoded.into_result(), Err(err));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Placement {
        node: String,
    }

    #[test]
    fn test_payload_type_needs_no_default() {
        let err = ServiceError::not_found("db-1");
        let wire = Response::<Placement>::fail(&err).encode().unwrap();
        assert_eq!(Response::<Placement>::decode(&wire).unwrap().into_result(), Err(err));

        let placement = Placement { node: "n1".to_string() };
        let wire = Response::ok(placement.clone()).encode().unwrap();
        assert_eq!(Response::<Placement>::decode(&wire).unwrap().into_result(), Ok(placement));
    }

    #[test]
    fn test_success_without_payload_is_internal() {
        let reply: Response<String> = Response {
            success: true,
            response: None,
            error: None,
        };
        assert!(reply.into_result().unwrap_err().is(codes::INTERNAL_ERROR));
    }

    #[test]
    fn test_decode_garbage_is_malformatted() {
        let err = SimpleResponse::decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { kind: "SimpleResponse", .. }));
        assert!(ServiceError::from(err).is(codes::MALFORMATTED_REQ));
    }

    #[test]
    fn test_failure_omits_response_field() {
        let reply: Response<String> = Response::fail(&ServiceError::gateway_timeout());
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.get("response").is_none());
        assert_eq!(json["error"]["msg"]["code"], 30700);
    }
}
