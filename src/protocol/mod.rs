//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol shared by every transport:
//! - 4-byte header encoding/decoding with a per-session byte order
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - `Error` frame payload

mod frame;
mod frame_buffer;
mod report;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::{FrameBuffer, ReadOutcome, MAX_EMPTY_READS};
pub use report::{ErrorCode, ErrorReport};
pub use wire_format::{
    flags, opcodes, pad, padded_len, peek_declared_length, write_header, Endian, Header,
    ProtocolVersion, BUFSIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
