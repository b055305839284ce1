//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing; a frame is
//! immutable once constructed.
//!
//! # Example
//!
//! ```
//! use shotwire::protocol::{flags, Frame, FrameKind, Header};
//! use bytes::Bytes;
//!
//! let header = Header::new(FrameKind::Result, flags::RESPONSE, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.kind(), FrameKind::Result);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{FrameKind, Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a frame from header and raw bytes (copies data).
    pub fn from_parts(header: Header, payload: &[u8]) -> Self {
        Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the frame kind.
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    /// Check if this is a response frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// Check if this is a stream chunk.
    #[inline]
    pub fn is_stream(&self) -> bool {
        self.header.is_stream()
    }

    /// Check if this is the final stream frame.
    #[inline]
    pub fn is_stream_end(&self) -> bool {
        self.header.is_stream_end()
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes header and appends payload into a contiguous buffer.
///
/// # Example
///
/// ```
/// use shotwire::protocol::{build_frame, FrameKind, Header, HEADER_SIZE};
///
/// let header = Header::new(FrameKind::Hello, 0, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_frame_creation() {
        let header = Header::new(FrameKind::Result, flags::RESPONSE, 5);
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert_eq!(frame.kind(), FrameKind::Result);
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.payload_len(), 5);
        assert!(frame.is_response());
    }

    #[test]
    fn test_frame_from_parts() {
        let header = Header::new(FrameKind::Getfile, 0, 4);
        let frame = Frame::from_parts(header, b"test");

        assert_eq!(frame.kind(), FrameKind::Getfile);
        assert_eq!(frame.payload(), b"test");
    }

    #[test]
    fn test_frame_empty_payload() {
        let header = Header::new(FrameKind::File, flags::FILE_END, 0);
        let frame = Frame::new(header, Bytes::new());

        assert_eq!(frame.payload_len(), 0);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_frame_flag_accessors() {
        let chunk = Frame::new(Header::new(FrameKind::File, flags::FILE_CHUNK, 0), Bytes::new());
        assert!(chunk.is_response());
        assert!(chunk.is_stream());
        assert!(!chunk.is_stream_end());

        let end = Frame::new(Header::new(FrameKind::File, flags::FILE_END, 0), Bytes::new());
        assert!(end.is_stream());
        assert!(end.is_stream_end());

        let request = Frame::new(Header::new(FrameKind::Makeshot, 0, 0), Bytes::new());
        assert!(!request.is_response());
    }

    #[test]
    fn test_build_frame_layout() {
        let header = Header::new(FrameKind::Result, flags::RESPONSE, 5);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let header = Header::new(FrameKind::Hello, 0, 0);
        let bytes = build_frame(&header, b"");

        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_build_frame_roundtrip() {
        use super::super::FrameBuffer;

        let header = Header::new(FrameKind::File, flags::FILE_CHUNK, 10);
        let payload = b"0123456789";
        let bytes = build_frame(&header, payload);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.kind(), FrameKind::File);
        assert_eq!(frame.payload(), payload);
        assert!(frame.is_stream());
    }
}
