//! JSON codec using `serde_json`.
//!
//! All structured payloads on the wire are UTF-8 JSON: job requests
//! inbound, result objects outbound. Clients in any language can speak
//! the protocol with a stock JSON library.

use serde_json::Value;

use crate::error::Result;

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode JSON bytes into a generic [`Value`].
    ///
    /// Used where the shape is inspected before a typed decode, e.g.
    /// pulling `id` and `action` out of a job payload.
    #[inline]
    pub fn decode_value(bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
