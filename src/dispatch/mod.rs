//! Dispatch module - JSON-RPC 2.0 envelopes and request routing.
//!
//! Provides:
//! - [`Request`], [`Response`], [`ErrorObject`] - the envelope types
//! - [`Dispatcher`] - turns one frame payload into one encoded reply
//!
//! # Example
//!
//! ```
//! use sentinel_rpc::dispatch::Dispatcher;
//! use sentinel_rpc::handler::{HandlerError, MethodRegistry};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let mut registry = MethodRegistry::new();
//! registry.register("echo", |params: serde_json::Value| async move {
//!     Ok::<_, HandlerError>(params)
//! });
//! let dispatcher = Dispatcher::new(registry);
//!
//! let reply = dispatcher
//!     .handle_frame(br#"{"jsonrpc":"2.0","method":"echo","params":"hi","id":"1"}"#)
//!     .await;
//! assert_eq!(&reply[..], br#"{"jsonrpc":"2.0","result":"hi","id":"1"}"#);
//! # });
//! ```

mod dispatcher;
mod envelope;

pub use dispatcher::{Dispatcher, Reply};
pub use envelope::{error_codes, ErrorObject, Outcome, Request, Response, JSONRPC_VERSION};
