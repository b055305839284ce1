//! Codec module - serialization/deserialization for payloads.
//!
//! This module provides codecs for encoding/decoding frame payloads:
//!
//! - [`JsonCodec`] - UTF-8 JSON for job requests and structured results
//! - [`RawCodec`] - Pass-through for raw bytes (file streams, zero-copy)
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than
//! trait objects. This allows for compile-time codec selection and enables
//! zero-copy optimizations on the raw path.
//!
//! # Example
//!
//! ```
//! use shotwire::codec::{JsonCodec, RawCodec};
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let raw = RawCodec::serialize(b"binary data");
//! assert_eq!(RawCodec::deserialize(&raw), b"binary data");
//! ```

mod json;
mod raw;

pub use json::JsonCodec;
pub use raw::RawCodec;
