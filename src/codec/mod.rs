//! Codec module - serialization/deserialization for frame payloads.
//!
//! - [`JsonCodec`] - JSON via `serde_json`, the only payload encoding the
//!   protocol speaks
//!
//! Codecs are marker structs with static methods rather than trait objects.

mod json;

pub use json::JsonCodec;
