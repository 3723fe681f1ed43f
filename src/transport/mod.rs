//! Transport module - socket handling for the connection loops.
//!
//! Provides:
//! - [`Listener`] / [`connect`] - TCP accept and connect
//! - [`is_disconnect`] - classifies reset-style I/O errors

mod tcp;

pub use tcp::{connect, is_disconnect, Listener};
