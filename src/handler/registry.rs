//! Method registry mapping JSON-RPC method names to handlers.
//!
//! Every handler is stored behind the same [`Handler`] trait. How it runs
//! is decided when it is registered:
//! - [`MethodRegistry::register`] for async handlers, awaited in place
//! - [`MethodRegistry::register_blocking`] for synchronous handlers, moved
//!   to tokio's blocking pool so they cannot stall other connections
//!
//! # Example
//!
//! ```
//! use sentinel_rpc::handler::{HandlerError, MethodRegistry};
//!
//! let mut registry = MethodRegistry::new();
//!
//! registry.register("echo", |params: serde_json::Value| async move {
//!     Ok::<_, HandlerError>(params)
//! });
//!
//! registry.register_blocking("sum", |numbers: Vec<i64>| {
//!     Ok::<_, HandlerError>(numbers.iter().sum::<i64>())
//! });
//!
//! assert!(registry.contains("echo"));
//! assert_eq!(registry.len(), 2);
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::HandlerError;

/// Result type for handler invocations.
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for method handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request with its raw `params` value (`Null` when absent).
    fn call(&self, params: Value) -> BoxFuture<'static, HandlerResult>;
}

/// How a registered handler is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Polled on the connection task.
    Async,
    /// Run on the blocking thread pool.
    Blocking,
}

/// Deserialize `params` into the handler's input type.
fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, HandlerError> {
    serde_json::from_value(params).map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

/// Serialize a handler's output into the `result` value.
fn into_result<R: Serialize>(output: R) -> HandlerResult {
    serde_json::to_value(output).map_err(|e| HandlerError::Unserializable(e.to_string()))
}

/// Wrapper that deserializes params before calling an async handler.
pub struct TypedHandler<F, T, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn(T) -> (Fut, R)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    fn call(&self, params: Value) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match parse_params(params) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move { into_result(fut.await?) })
    }
}

/// Wrapper that runs a synchronous handler on the blocking pool.
pub struct BlockingHandler<F, T, R> {
    handler: Arc<F>,
    _phantom: PhantomData<fn(T) -> R>,
}

impl<F, T, R> BlockingHandler<F, T, R>
where
    F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    /// Create a new blocking handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler: Arc::new(handler),
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R> Handler for BlockingHandler<F, T, R>
where
    F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, params: Value) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match parse_params(params) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let output = tokio::task::spawn_blocking(move || handler(parsed))
                .await
                .map_err(|e| HandlerError::Internal(format!("blocking handler failed: {}", e)))?;
            into_result(output?)
        })
    }
}

/// Entry for a registered method.
struct MethodEntry {
    handler: Box<dyn Handler>,
    mode: ExecutionMode,
}

/// Registry mapping method names to handlers.
///
/// Built before serving starts; the server only reads it afterwards, so it
/// can be shared between connections behind an `Arc` without locking.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async method handler.
    ///
    /// Registering a name twice replaces the earlier handler.
    pub fn register<F, T, R, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.insert(name, ExecutionMode::Async, Box::new(TypedHandler::new(handler)));
    }

    /// Register a synchronous method handler that runs on the blocking pool.
    pub fn register_blocking<F, T, R>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.insert(
            name,
            ExecutionMode::Blocking,
            Box::new(BlockingHandler::new(handler)),
        );
    }

    /// Register a pre-built handler object.
    pub fn insert(&mut self, name: &str, mode: ExecutionMode, handler: Box<dyn Handler>) {
        self.methods
            .insert(name.to_string(), MethodEntry { handler, mode });
    }

    /// Get a handler by method name.
    pub fn get_handler(&self, name: &str) -> Option<&dyn Handler> {
        self.methods.get(name).map(|e| e.handler.as_ref())
    }

    /// Get the execution mode a method was registered with.
    pub fn execution_mode(&self, name: &str) -> Option<ExecutionMode> {
        self.methods.get(name).map(|e| e.mode)
    }

    /// Check whether a method is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
