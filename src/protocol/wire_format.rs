//! Wire format encoding and decoding.
//!
//! Implements the 6-byte header format:
//! ```text
//! ┌──────┬───────┬────────────────┐
//! │ Kind │ Flags │ Payload length │
//! │ 1 B  │ 1 B   │ 4 B, u32 BE    │
//! └──────┴───────┴────────────────┘
//! ```
//!
//! The transport itself carries no message boundary, so every message on
//! the wire is one header followed by exactly `payload_length` payload
//! bytes. The kind byte selects the action for inbound frames and tags
//! the response type for outbound frames.

use crate::error::{Error, Result};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Default maximum inbound payload size (64 MB).
///
/// Declared lengths above the configured cap are rejected before any
/// payload bytes are buffered.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Reserved kind byte (never valid on the wire).
pub const RESERVED_KIND: u8 = 0;

/// Flag constants for the protocol.
pub mod flags {
    /// Response frame (set on everything the service sends).
    pub const IS_RESPONSE: u8 = 0b0000_0001;
    /// Stream chunk: one piece of a byte stream (file payloads).
    pub const IS_STREAM: u8 = 0b0000_0010;
    /// Final frame of a stream; always carries an empty payload.
    pub const STREAM_END: u8 = 0b0000_0100;

    /// Reserved bits mask (bits 3-7).
    pub const RESERVED_MASK: u8 = 0b1111_1000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    // Common flag combinations for responses

    /// Plain structured response: is_response = 0x01
    pub const RESPONSE: u8 = IS_RESPONSE;
    /// File chunk: is_response + is_stream = 0x03
    pub const FILE_CHUNK: u8 = IS_RESPONSE | IS_STREAM;
    /// File end: is_response + is_stream + stream_end = 0x07
    pub const FILE_END: u8 = IS_RESPONSE | IS_STREAM | STREAM_END;
}

/// Frame kind tag.
///
/// Request kinds double as the transport-level action hint: a job payload
/// that omits `action` falls back to the kind it arrived under. Response
/// kinds tag the payload so the remote end can tell structured results
/// from raw byte streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Minimal ping request.
    Hello = 0x01,
    /// Screenshot job request.
    Makeshot = 0x02,
    /// Link-geometry extraction job request.
    Makelist = 0x03,
    /// File fetch request.
    Getfile = 0x04,
    /// Output-directory removal request.
    Clean = 0x05,

    /// Structured job result.
    Result = 0x10,
    /// Raw file bytes, chunked.
    File = 0x11,
    /// Result of a `clean` job.
    CleanResult = 0x12,
    /// Result of a `makelist` job.
    MakelistResult = 0x13,
}

impl FrameKind {
    /// Decode a kind byte.
    ///
    /// # Example
    ///
    /// ```
    /// use shotwire::protocol::FrameKind;
    ///
    /// assert_eq!(FrameKind::from_u8(0x02), Some(FrameKind::Makeshot));
    /// assert_eq!(FrameKind::from_u8(0xEE), None);
    /// ```
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::Makeshot),
            0x03 => Some(Self::Makelist),
            0x04 => Some(Self::Getfile),
            0x05 => Some(Self::Clean),
            0x10 => Some(Self::Result),
            0x11 => Some(Self::File),
            0x12 => Some(Self::CleanResult),
            0x13 => Some(Self::MakelistResult),
            _ => None,
        }
    }

    /// The kind byte as written on the wire.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Wire name of this kind, used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Makeshot => "makeshot",
            Self::Makelist => "makelist",
            Self::Getfile => "getfile",
            Self::Clean => "clean",
            Self::Result => "result",
            Self::File => "file",
            Self::CleanResult => "clean_result",
            Self::MakelistResult => "makelist_result",
        }
    }

    /// Check if this kind is a client request.
    #[inline]
    pub fn is_request(self) -> bool {
        (self as u8) < 0x10
    }

    /// Check if this kind is a service response.
    #[inline]
    pub fn is_response(self) -> bool {
        !self.is_request()
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind tag.
    pub kind: FrameKind,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: FrameKind, flags: u8, payload_length: u32) -> Self {
        Self {
            kind,
            flags,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use shotwire::protocol::{flags, FrameKind, Header};
    ///
    /// let header = Header::new(FrameKind::Result, flags::RESPONSE, 100);
    /// assert_eq!(header.encode().len(), 6);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind.as_u8();
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// The caller must supply at least [`HEADER_SIZE`] bytes; an unknown
    /// kind byte is a protocol error, not a "need more data" condition.
    ///
    /// # Example
    ///
    /// ```
    /// use shotwire::protocol::{FrameKind, Header};
    ///
    /// let bytes = [0x10, 0x01, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.kind, FrameKind::Result);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let kind = FrameKind::from_u8(buf[0])
            .ok_or_else(|| Error::Protocol(format!("unknown frame kind: {:#04x}", buf[0])))?;

        Ok(Self {
            kind,
            flags: buf[1],
            payload_length: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(Error::Protocol(format!(
                "payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(Error::Protocol(
                "reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is a response frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    /// Check if this is a stream chunk.
    #[inline]
    pub fn is_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_STREAM)
    }

    /// Check if this is the final stream frame.
    #[inline]
    pub fn is_stream_end(&self) -> bool {
        flags::has_flag(self.flags, flags::STREAM_END)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(FrameKind::Result, flags::RESPONSE, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(FrameKind::File, 0x03, 0x0809_0A0B);
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x11);
        assert_eq!(bytes[1], 0x03);

        // Payload length: 0x08090A0B in BE
        assert_eq!(bytes[2], 0x08);
        assert_eq!(bytes[3], 0x09);
        assert_eq!(bytes[4], 0x0A);
        assert_eq!(bytes[5], 0x0B);
    }

    #[test]
    fn test_header_size_is_exactly_6() {
        assert_eq!(HEADER_SIZE, 6);
        let header = Header::new(FrameKind::Hello, 0, 0);
        assert_eq!(header.encode().len(), 6);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 5]; // One byte short
        assert!(Header::decode(&buf).is_err());
    }

    #[test]
    fn test_decode_unknown_kind_rejected() {
        let buf = [0xEEu8, 0, 0, 0, 0, 0];
        let result = Header::decode(&buf);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unknown frame kind"));
    }

    #[test]
    fn test_decode_reserved_kind_rejected() {
        let buf = [RESERVED_KIND, 0, 0, 0, 0, 0];
        assert!(Header::decode(&buf).is_err());
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(FrameKind::Makeshot, 0, 1_000_000);
        let result = header.validate(100); // Max 100 bytes
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(FrameKind::Hello, 0b1000_0000, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("reserved flag bits"));
    }

    #[test]
    fn test_flags_has_flag() {
        assert!(flags::has_flag(flags::FILE_CHUNK, flags::IS_RESPONSE));
        assert!(flags::has_flag(flags::FILE_CHUNK, flags::IS_STREAM));
        assert!(!flags::has_flag(flags::FILE_CHUNK, flags::STREAM_END));
    }

    #[test]
    fn test_flag_combinations() {
        assert_eq!(flags::RESPONSE, 0x01);
        assert_eq!(flags::FILE_CHUNK, 0x03);
        assert_eq!(flags::FILE_END, 0x07);
    }

    #[test]
    fn test_kind_roundtrip_all() {
        for byte in 0u8..=0xFF {
            if let Some(kind) = FrameKind::from_u8(byte) {
                assert_eq!(kind.as_u8(), byte);
            }
        }
    }

    #[test]
    fn test_kind_direction() {
        assert!(FrameKind::Hello.is_request());
        assert!(FrameKind::Clean.is_request());
        assert!(FrameKind::Result.is_response());
        assert!(FrameKind::MakelistResult.is_response());
        assert!(!FrameKind::Makeshot.is_response());
    }

    #[test]
    fn test_kind_names_match_wire_protocol() {
        assert_eq!(FrameKind::Result.name(), "result");
        assert_eq!(FrameKind::CleanResult.name(), "clean_result");
        assert_eq!(FrameKind::MakelistResult.name(), "makelist_result");
    }

    #[test]
    fn test_header_accessors() {
        let header = Header::new(FrameKind::File, flags::FILE_END, 0);

        assert!(header.is_response());
        assert!(header.is_stream());
        assert!(header.is_stream_end());

        let request = Header::new(FrameKind::Makeshot, 0, 10);
        assert!(!request.is_response());
        assert!(!request.is_stream());
    }
}
