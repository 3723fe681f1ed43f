//! Handler module - method registration and the handler failure contract.
//!
//! Provides:
//! - [`MethodRegistry`] - maps method names to handlers
//! - [`HandlerError`] - the failures a handler invocation can end in
//!
//! Handlers take the request's `params` deserialized into any
//! `DeserializeOwned` type and return any `Serialize` value. A `params`
//! value that does not fit the handler's input type is reported as
//! [`HandlerError::InvalidParams`] without running the handler.

mod registry;

use thiserror::Error;

pub use registry::{
    BlockingHandler, BoxFuture, ExecutionMode, Handler, HandlerResult, MethodRegistry,
    TypedHandler,
};

/// Failure reported by a method handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The params value has the wrong shape or arity (-32602).
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Any other failure while running the method (-32603).
    #[error("internal error: {0}")]
    Internal(String),

    /// The method's output could not be encoded as JSON.
    ///
    /// Answered as a bare Internal error with `id: null`, like any other
    /// failure to encode an outgoing reply.
    #[error("result is not serializable: {0}")]
    Unserializable(String),
}

impl HandlerError {
    /// Create an invalid params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Detail text without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidParams(message)
            | Self::Internal(message)
            | Self::Unserializable(message) => message,
        }
    }
}
