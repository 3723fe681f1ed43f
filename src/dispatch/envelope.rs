//! JSON-RPC 2.0 envelopes.
//!
//! Requests are validated from a raw `serde_json::Value` rather than
//! deserialized into a struct, so that every malformed shape maps onto
//! Invalid Request instead of a generic decode error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handler::HandlerError;

/// Protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Error member of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(error_codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(error_codes::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(error_codes::INVALID_PARAMS, "Invalid params")
    }

    pub fn internal_error() -> Self {
        Self::new(error_codes::INTERNAL_ERROR, "Internal error")
    }

    /// Attach additional data.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl From<HandlerError> for ErrorObject {
    fn from(err: HandlerError) -> Self {
        let base = match err {
            HandlerError::InvalidParams(_) => Self::invalid_params(),
            HandlerError::Internal(_) => Self::internal_error(),
            HandlerError::Unserializable(_) => return Self::internal_error(),
        };
        match err.detail() {
            "" => base,
            detail => base.with_data(detail),
        }
    }
}

/// Either the `result` or the `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Echo of the request id, `null` when it could not be determined.
    #[serde(default)]
    pub id: Value,
}

impl Response {
    /// Create a success response.
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome: Outcome::Result(result),
            id,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome: Outcome::Error(error),
            id,
        }
    }

    /// Check if this response is an error.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Get the result, or the error object if the call failed.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }
}

/// Request envelope.
///
/// `id: None` marks a notification. An explicit `"id": null` is kept as
/// `Some(Value::Null)` and is treated as a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Request {
    /// Create a call that expects a response.
    pub fn call(method: impl Into<String>, params: Value, id: impl Into<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(id.into()),
        }
    }

    /// Create a notification (no id, no response).
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: None,
        }
    }

    /// Validate a decoded value as a request envelope.
    ///
    /// Rejects anything that is not an object, lacks `"jsonrpc": "2.0"`,
    /// or lacks a string `method`. Other members are ignored.
    pub fn from_value(value: Value) -> Result<Self, ErrorObject> {
        let Value::Object(mut object) = value else {
            return Err(ErrorObject::invalid_request());
        };

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(ErrorObject::invalid_request());
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(ErrorObject::invalid_request()),
        };

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params: object.remove("params"),
            id: object.remove("id"),
        })
    }

    /// Check if this request is a notification.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}
