//! Error types for sentinel-rpc.

use thiserror::Error;

/// Main error type for transport and client operations.
///
/// Request-level failures never show up here on the server side: the
/// dispatcher turns them into JSON-RPC error envelopes instead.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (malformed response envelope, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer closed the connection before a complete frame arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server answered with a JSON-RPC error object.
    #[error("Server error {code}: {message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
