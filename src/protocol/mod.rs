//! Protocol module - wire format and incremental framing.
//!
//! This module implements the byte-stream layer under JSON-RPC:
//! - sentinel constants and frame packing
//! - frame buffer for splitting a chunked stream back into payloads

mod frame_buffer;
mod wire_format;

pub use frame_buffer::{FrameBuffer, Frames};
pub use wire_format::{
    build_frame, pack_with, DEFAULT_MAX_PAYLOAD_SIZE, END_OF_FRAME, FRAME_OVERHEAD, START_OF_FRAME,
};
