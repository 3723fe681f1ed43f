//! Request dispatcher: validation, routing, batch fan-out.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use super::envelope::{ErrorObject, Request, Response};
use crate::handler::{Handler, HandlerError, MethodRegistry};

/// Encoded Internal error used when even the fallback envelope fails to encode.
const INTERNAL_ERROR_FRAME: &[u8] =
    br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

/// What a single frame produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// Answer to a single envelope (or a top-level error).
    Single(Response),
    /// Answers to a batch, in input order, notifications omitted.
    Batch(Vec<Response>),
}

/// Routes decoded envelopes to the registered handlers.
///
/// The dispatcher owns the [`MethodRegistry`] and only reads it, so one
/// instance is shared by every connection.
pub struct Dispatcher {
    registry: MethodRegistry,
}

impl Dispatcher {
    /// Create a dispatcher over a fully populated registry.
    pub fn new(registry: MethodRegistry) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher routes to.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Handle one frame payload and return the encoded reply.
    ///
    /// Never fails. The result is empty when nothing must be sent back
    /// (a notification, or a batch made only of notifications).
    pub async fn handle_frame(&self, frame: &[u8]) -> Bytes {
        let reply = match serde_json::from_slice::<Value>(frame) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::debug!(error = %e, "Frame is not valid JSON");
                Some(Reply::Single(Response::error(
                    Value::Null,
                    ErrorObject::parse_error(),
                )))
            }
        };

        match reply {
            Some(reply) => encode_reply(&reply),
            None => Bytes::new(),
        }
    }

    /// Handle a decoded message: a single envelope or a batch.
    pub async fn handle_message(&self, message: Value) -> Option<Reply> {
        match message {
            Value::Array(entries) if entries.is_empty() => Some(Reply::Single(Response::error(
                Value::Null,
                ErrorObject::invalid_request(),
            ))),
            Value::Array(entries) => {
                // Fan out, join everything, then drop notification slots.
                let responses: Vec<Response> =
                    join_all(entries.into_iter().map(|entry| self.handle_request(entry)))
                        .await
                        .into_iter()
                        .flatten()
                        .collect();

                if responses.is_empty() {
                    None
                } else {
                    Some(Reply::Batch(responses))
                }
            }
            single => self.handle_request(single).await.map(Reply::Single),
        }
    }

    /// Handle one envelope. Returns `None` for notifications.
    pub async fn handle_request(&self, value: Value) -> Option<Response> {
        let request = match Request::from_value(value) {
            Ok(request) => request,
            Err(error) => return Some(Response::error(Value::Null, error)),
        };

        let params = request.params.unwrap_or(Value::Null);
        match request.id {
            Some(id) => Some(self.call(&request.method, params, id).await),
            None => {
                self.notify(&request.method, params).await;
                None
            }
        }
    }

    async fn call(&self, method: &str, params: Value, id: Value) -> Response {
        let Some(handler) = self.registry.get_handler(method) else {
            tracing::debug!(method, "Method not found");
            return Response::error(id, ErrorObject::method_not_found().with_data(method));
        };

        match invoke(handler, params).await {
            Ok(result) => Response::result(id, result),
            Err(Fault::Panicked(e)) => {
                tracing::warn!(method, panic = %e.detail(), "Handler panicked");
                Response::error(id, e.into())
            }
            Err(Fault::Failed(e @ HandlerError::Unserializable(_))) => {
                tracing::warn!(method, error = %e, "Failed to encode result");
                Response::error(Value::Null, e.into())
            }
            Err(Fault::Failed(e)) => {
                tracing::debug!(method, error = %e, "Handler failed");
                Response::error(id, e.into())
            }
        }
    }

    /// Run a notification; unknown methods and failures are dropped.
    async fn notify(&self, method: &str, params: Value) {
        if let Some(handler) = self.registry.get_handler(method) {
            let _ = invoke(handler, params).await;
        }
    }
}

/// How a handler invocation went wrong.
enum Fault {
    /// The handler reported an error.
    Failed(HandlerError),
    /// The handler panicked; carries the panic message as an Internal error.
    Panicked(HandlerError),
}

/// Call a handler, catching a panic at any point.
async fn invoke(handler: &dyn Handler, params: Value) -> Result<Value, Fault> {
    let fut = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(params))) {
        Ok(fut) => fut,
        Err(payload) => return Err(Fault::Panicked(panicked(payload))),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(Fault::Failed),
        Err(payload) => Err(Fault::Panicked(panicked(payload))),
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> HandlerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    HandlerError::Internal(message)
}

/// Encode a reply, substituting an Internal error if encoding fails.
fn encode_reply(reply: &Reply) -> Bytes {
    match serde_json::to_vec(reply) {
        Ok(encoded) => Bytes::from(encoded),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode reply");
            serde_json::to_vec(&Response::error(Value::Null, ErrorObject::internal_error()))
                .map(Bytes::from)
                .unwrap_or_else(|_| Bytes::from_static(INTERNAL_ERROR_FRAME))
        }
    }
}
