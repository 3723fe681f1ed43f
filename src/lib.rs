//! # sentinel-rpc
//!
//! JSON-RPC 2.0 over a byte stream framed by single-byte sentinels.
//!
//! This crate provides both ends of the transport: a server that hosts
//! many connections, and a client that opens one connection per request.
//!
//! ## Architecture
//!
//! ```text
//! bytes ─► FrameBuffer::feed ─► frames ─► Dispatcher::handle_frame ─► reply ─► build_frame ─► bytes
//! ```
//!
//! - **Framing** (`protocol`): `0xA5` + payload + `0x00`, no escaping
//! - **Dispatch** (`dispatch`): validation, routing, batches
//! - **Handlers** (`handler`): async or blocking, declared at registration
//!
//! ## Example
//!
//! ```ignore
//! use sentinel_rpc::handler::HandlerError;
//! use sentinel_rpc::{RpcClient, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .method("echo", |params: serde_json::Value| async move {
//!             Ok::<_, HandlerError>(params)
//!         })
//!         .bind("127.0.0.1:0")
//!         .await?;
//!     let addr = server.local_addr()?;
//!     tokio::spawn(server.serve());
//!
//!     let mut client = RpcClient::new(addr.to_string());
//!     let echoed: String = client.call("echo", "hi").await?;
//!     assert_eq!(echoed, "hi");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod transport;

mod client;
mod server;

pub use client::RpcClient;
pub use dispatch::Dispatcher;
pub use error::{Result, RpcError};
pub use server::{serve_connection, Server, ServerBuilder};
