//! One-shot JSON-RPC client.
//!
//! Every request opens a fresh connection, writes one frame, waits for
//! one frame back and closes. There is no pooling and no pipelining; a
//! caller that needs a deadline wraps the call in `tokio::time::timeout`.
//!
//! # Example
//!
//! ```ignore
//! use sentinel_rpc::RpcClient;
//!
//! let mut client = RpcClient::new("127.0.0.1:8888");
//!
//! // Raw response envelope
//! let response = client.send_request("echo", "hello world").await?;
//! assert_eq!(response["result"], "hello world");
//!
//! // Typed result, error envelopes become `RpcError::Server`
//! let echoed: String = client.call("echo", "hello world").await?;
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::codec::JsonCodec;
use crate::config::DEFAULT_READ_CHUNK_SIZE;
use crate::dispatch::{ErrorObject, Request, Response};
use crate::error::{Result, RpcError};
use crate::protocol::FrameBuffer;
use crate::transport::connect;

impl From<ErrorObject> for RpcError {
    fn from(err: ErrorObject) -> Self {
        RpcError::Server {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Client for a sentinel-framed JSON-RPC server.
pub struct RpcClient {
    /// Server address, resolved on every request.
    addr: String,
    /// Reset before each request.
    frame_buffer: FrameBuffer,
    read_chunk_size: usize,
}

impl RpcClient {
    /// Create a client for the server at `addr` (`host:port`).
    ///
    /// No connection is opened until the first request.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            frame_buffer: FrameBuffer::new(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Set how many bytes each read asks for. Default: 1024.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Cap the payload size of a response frame. Default: 16 MiB.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.frame_buffer = FrameBuffer::with_max_payload(size);
        self
    }

    /// The server address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a call and return the decoded response envelope as-is.
    ///
    /// # Errors
    ///
    /// Fails only on transport problems or an undecodable reply; JSON-RPC
    /// error envelopes are returned like any other response.
    pub async fn send_request<P: Serialize>(&mut self, method: &str, params: P) -> Result<Value> {
        let request = Request::call(method, serde_json::to_value(params)?, new_request_id());
        let frame = self.exchange(&request).await?;
        JsonCodec::decode(&frame)
    }

    /// Send a call and return the typed response envelope.
    ///
    /// # Errors
    ///
    /// Besides transport failures, returns `RpcError::Protocol` when the
    /// reply is not a response envelope or answers a different id.
    pub async fn request<P: Serialize>(&mut self, method: &str, params: P) -> Result<Response> {
        let id = new_request_id();
        let request = Request::call(method, serde_json::to_value(params)?, id.as_str());
        let frame = self.exchange(&request).await?;

        let response: Response = JsonCodec::decode(&frame)
            .map_err(|e| RpcError::Protocol(format!("Malformed response: {}", e)))?;

        // Server-side failures that happen before the id is known echo `null`.
        if response.id != Value::Null && response.id != Value::String(id) {
            return Err(RpcError::Protocol(format!(
                "Response id {} does not match the request",
                response.id
            )));
        }

        Ok(response)
    }

    /// Call a method and deserialize its result.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Server` when the server answers with an error.
    pub async fn call<P: Serialize, T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: P,
    ) -> Result<T> {
        let result = self.request(method, params).await?.into_result()?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a notification. Nothing is read back.
    pub async fn notify<P: Serialize>(&mut self, method: &str, params: P) -> Result<()> {
        let request = Request::notification(method, serde_json::to_value(params)?);
        let payload = JsonCodec::encode(&request)?;

        let mut stream = connect(self.addr.as_str()).await?;
        stream.write_all(&self.frame_buffer.pack(&payload)).await?;
        stream.flush().await?;
        let _ = stream.shutdown().await;
        Ok(())
    }

    /// Write one request frame on a new connection and read one frame back.
    async fn exchange(&mut self, request: &Request) -> Result<Bytes> {
        self.frame_buffer.reset();
        let payload = JsonCodec::encode(request)?;

        let mut stream = connect(self.addr.as_str()).await?;
        tracing::debug!(addr = %self.addr, method = %request.method, "Sending request");

        stream.write_all(&self.frame_buffer.pack(&payload)).await?;
        stream.flush().await?;

        let frame = self.wait_for_response(&mut stream).await;
        let _ = stream.shutdown().await;
        frame
    }

    /// Read until the first complete frame arrives.
    async fn wait_for_response<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Bytes> {
        let mut buf = vec![0u8; self.read_chunk_size];
        let oversized = self.frame_buffer.oversized_frames();

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Err(RpcError::ConnectionClosed);
            }

            if let Some(frame) = self.frame_buffer.feed(&buf[..n]).next() {
                return Ok(frame);
            }

            if self.frame_buffer.oversized_frames() > oversized {
                return Err(RpcError::Protocol(format!(
                    "Response exceeds {} bytes",
                    self.frame_buffer.max_payload_size()
                )));
            }
        }
    }
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
