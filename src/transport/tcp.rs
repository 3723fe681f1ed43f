//! TCP listener and connect helpers.
//!
//! The connection loops only need `AsyncRead + AsyncWrite`, so anything
//! tokio can read and write (Unix sockets, `tokio::io::duplex` pairs)
//! plugs in as well; TCP is what the server binds by default.
//!
//! # Example
//!
//! ```ignore
//! use sentinel_rpc::transport::Listener;
//!
//! let listener = Listener::bind("127.0.0.1:0").await?;
//! let (stream, peer) = listener.accept().await?;
//! ```

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::Result;

/// TCP listener accepting RPC connections.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Bind to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        // Frames are small and written whole; don't hold them back.
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    /// Get the bound address (useful after binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Open a fresh connection to a server.
pub async fn connect(addr: impl ToSocketAddrs) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Whether an I/O error means the peer went away.
///
/// Such errors end a connection quietly instead of being reported.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
