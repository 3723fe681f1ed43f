//! Server configuration loaded from `SENTINEL_RPC_*` environment variables.
//!
//! Unset or blank variables fall back to the defaults below.

use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Environment variable naming the address to bind.
pub const ENV_BIND_ADDR: &str = "SENTINEL_RPC_BIND_ADDR";
/// Environment variable naming the port to bind.
pub const ENV_BIND_PORT: &str = "SENTINEL_RPC_BIND_PORT";
/// Environment variable setting the per-read buffer size.
pub const ENV_READ_CHUNK: &str = "SENTINEL_RPC_READ_CHUNK";
/// Environment variable capping the payload size of one frame.
pub const ENV_MAX_FRAME: &str = "SENTINEL_RPC_MAX_FRAME";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 8888;
/// Bytes requested per transport read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    pub read_chunk_size: usize,
    pub max_frame_size: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SENTINEL_RPC_BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("SENTINEL_RPC_READ_CHUNK must be a positive integer")]
    InvalidReadChunk,
    #[error("SENTINEL_RPC_MAX_FRAME must be a positive integer")]
    InvalidMaxFrame,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            bind_port: DEFAULT_BIND_PORT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = read(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_port = read(ENV_BIND_PORT)
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);
        let read_chunk_size = read(ENV_READ_CHUNK)
            .map(|value| parse_positive(&value).ok_or(ConfigError::InvalidReadChunk))
            .transpose()?
            .unwrap_or(DEFAULT_READ_CHUNK_SIZE);
        let max_frame_size = read(ENV_MAX_FRAME)
            .map(|value| parse_positive(&value).ok_or(ConfigError::InvalidMaxFrame))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE);

        let config = Self {
            bind_addr,
            bind_port,
            read_chunk_size,
            max_frame_size,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn parse_positive(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|size| *size > 0)
}
