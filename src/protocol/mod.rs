//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol for the socket service:
//! - 6-byte header encoding/decoding (kind, flags, payload length)
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, FrameKind, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, RESERVED_KIND,
};
