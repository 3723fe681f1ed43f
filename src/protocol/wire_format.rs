//! Wire format constants and frame packing.
//!
//! Every message on the stream is wrapped in two sentinel bytes:
//! ```text
//! ┌──────┬───────────────────────┬──────┐
//! │ 0xA5 │ UTF-8 JSON payload    │ 0x00 │
//! │ SOF  │ (no length, no escape)│ EOF  │
//! └──────┴───────────────────────┴──────┘
//! ```
//!
//! Sentinel values are not escaped inside the payload. A payload that
//! contains either byte will be split or truncated by the receiver.

use bytes::{BufMut, Bytes, BytesMut};

/// Start-of-frame sentinel.
pub const START_OF_FRAME: u8 = 0xA5;

/// End-of-frame sentinel.
pub const END_OF_FRAME: u8 = 0x00;

/// Bytes added around every payload (one sentinel on each side).
pub const FRAME_OVERHEAD: usize = 2;

/// Default cap on a single frame payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Wrap `payload` in the given sentinels.
#[inline]
pub fn pack_with(start: u8, end: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.put_u8(start);
    buf.put_slice(payload);
    buf.put_u8(end);
    buf.freeze()
}

/// Build a complete frame using the default sentinels.
#[inline]
pub fn build_frame(payload: &[u8]) -> Bytes {
    pack_with(START_OF_FRAME, END_OF_FRAME, payload)
}
