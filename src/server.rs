//! Server builder and per-connection loop.
//!
//! The [`ServerBuilder`] collects method handlers into a registry, then
//! [`Server`] owns it for the rest of its life:
//! 1. Bind a TCP listener
//! 2. Accept connections, one task each
//! 3. Read chunks, split them into frames, dispatch, write replies
//!
//! # Example
//!
//! ```ignore
//! use sentinel_rpc::handler::HandlerError;
//! use sentinel_rpc::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .method("echo", |params: serde_json::Value| async move {
//!             Ok::<_, HandlerError>(params)
//!         })
//!         .blocking_method("fib", |n: u64| Ok::<_, HandlerError>(fib(n)))
//!         .bind("127.0.0.1:8888")
//!         .await?;
//!
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::ToSocketAddrs;
use tracing::Instrument;

use crate::config::{ServerConfig, DEFAULT_READ_CHUNK_SIZE};
use crate::dispatch::Dispatcher;
use crate::error::{Result, RpcError};
use crate::handler::{HandlerError, MethodRegistry};
use crate::protocol::{build_frame, FrameBuffer, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::{is_disconnect, Listener};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Builder for configuring and creating a server.
///
/// Register every method before calling [`bind`](Self::bind); the
/// registry cannot change once the server is running.
pub struct ServerBuilder {
    registry: MethodRegistry,
    read_chunk_size: usize,
    max_frame_size: usize,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            registry: MethodRegistry::new(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Create a builder with the knobs taken from a loaded config.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new()
            .read_chunk_size(config.read_chunk_size)
            .max_frame_size(config.max_frame_size)
    }

    /// Register an async method handler.
    pub fn method<F, T, R, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.registry.register(name, handler);
        self
    }

    /// Register a synchronous method handler.
    ///
    /// It runs on the blocking pool so long computations do not hold up
    /// other connections.
    pub fn blocking_method<F, T, R>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.registry.register_blocking(name, handler);
        self
    }

    /// Set how many bytes each transport read asks for.
    ///
    /// Default: 1024. Zero is bumped to one.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Cap the payload size of one incoming frame.
    ///
    /// Default: 16 MiB. Longer frames are dropped without a reply.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Freeze the registry into a dispatcher without binding a socket.
    pub fn into_dispatcher(self) -> Dispatcher {
        Dispatcher::new(self.registry)
    }

    /// Bind the listener and build the server.
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<Server> {
        let listener = Listener::bind(addr).await?;

        Ok(Server {
            listener,
            dispatcher: Arc::new(Dispatcher::new(self.registry)),
            read_chunk_size: self.read_chunk_size,
            max_frame_size: self.max_frame_size,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound server, ready to accept connections.
pub struct Server {
    listener: Listener,
    /// Shared by every connection task.
    dispatcher: Arc<Dispatcher>,
    read_chunk_size: usize,
    max_frame_size: usize,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process ends.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connections already running are left to finish on their own.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let registry = self.dispatcher.registry();
        for name in registry.method_names() {
            if let Some(mode) = registry.execution_mode(name) {
                tracing::debug!(method = name, ?mode, "Registered method");
            }
        }
        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, methods = registry.len(), "Serving");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let read_chunk_size = self.read_chunk_size;
        let max_frame_size = self.max_frame_size;

        tokio::spawn(
            async move {
                tracing::debug!("Connection opened");
                let outcome =
                    serve_connection(stream, &dispatcher, read_chunk_size, max_frame_size).await;
                if let Err(e) = outcome {
                    tracing::warn!("Connection error: {}", e);
                }
                tracing::debug!("Connection closed");
            }
            .instrument(tracing::info_span!("connection", %peer)),
        );
    }
}

/// Serve one connection until the peer hangs up.
///
/// Frames are handled strictly one after another: the next frame is not
/// looked at until the reply to the current one has been written. A
/// reset-style I/O error counts as a normal end of stream. The stream is
/// shut down on every exit path. Frames whose payload exceeds
/// `max_frame_size` are dropped without a reply.
pub async fn serve_connection<S>(
    mut stream: S,
    dispatcher: &Dispatcher,
    read_chunk_size: usize,
    max_frame_size: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame_buffer = FrameBuffer::with_max_payload(max_frame_size);
    let outcome = read_loop(&mut stream, frame_buffer, dispatcher, read_chunk_size).await;
    let _ = stream.shutdown().await;

    match outcome {
        Err(RpcError::Io(e)) if is_disconnect(&e) => {
            tracing::debug!("Peer disconnected: {}", e);
            Ok(())
        }
        other => other,
    }
}

async fn read_loop<S>(
    stream: &mut S,
    mut frame_buffer: FrameBuffer,
    dispatcher: &Dispatcher,
    read_chunk_size: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut oversized = 0;
    let mut buf = vec![0u8; read_chunk_size.max(1)];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => return Ok(()), // Connection closed
            Ok(n) => n,
            Err(e) => return Err(RpcError::Io(e)),
        };

        for frame in frame_buffer.feed(&buf[..n]) {
            tracing::trace!(len = frame.len(), "Frame received");
            let reply = dispatcher.handle_frame(&frame).await;

            // Notifications get nothing back, not even an empty frame.
            if reply.is_empty() {
                continue;
            }

            stream.write_all(&build_frame(&reply)).await?;
            stream.flush().await?;
        }

        if frame_buffer.oversized_frames() > oversized {
            oversized = frame_buffer.oversized_frames();
            tracing::warn!(
                limit = frame_buffer.max_payload_size(),
                "Dropped frame exceeding the size limit"
            );
        }
    }
}
