//! Raw codec - pass-through for binary data.
//!
//! Used for file payloads that should be sent as-is, byte for byte.
//! Provides zero-copy operations where possible.

use bytes::Bytes;

/// Raw codec that passes bytes through without transformation.
pub struct RawCodec;

impl RawCodec {
    /// Serialize raw bytes (copies data into Bytes).
    ///
    /// For truly zero-copy, use `serialize_bytes` with an existing `Bytes`
    /// value.
    #[inline]
    pub fn serialize(data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }

    /// Serialize Bytes (true zero-copy, just returns the input).
    #[inline]
    pub fn serialize_bytes(data: Bytes) -> Bytes {
        data
    }

    /// Deserialize - returns a reference to the input (zero-copy).
    #[inline]
    pub fn deserialize(data: &[u8]) -> &[u8] {
        data
    }
}
