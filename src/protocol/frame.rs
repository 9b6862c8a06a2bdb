//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing. The payload always
//! includes its padding, so `header.payload_len() == payload.len()`.
//!
//! # Example
//!
//! ```
//! use xim_client::protocol::{build_frame, Endian, FrameBuffer, opcodes};
//!
//! let bytes = build_frame(Endian::Little, opcodes::SYNC, 0, &[7, 0, 3, 0]).unwrap();
//! let mut buffer = FrameBuffer::new(Endian::Little);
//! let frames = buffer.push(&bytes).unwrap();
//!
//! assert_eq!(frames[0].major(), opcodes::SYNC);
//! assert_eq!(frames[0].payload(), &[7, 0, 3, 0]);
//! ```

use bytes::Bytes;

use super::wire_format::{pad, Endian, Header, HEADER_SIZE};
use crate::codec::WireReader;
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes including padding.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a frame from an unpadded payload, adding zero padding.
    pub fn from_payload(major: u8, minor: u8, payload: &[u8]) -> Result<Self> {
        let header = Header::for_payload(major, minor, payload.len())?;
        let mut padded = Vec::with_capacity(header.payload_len());
        padded.extend_from_slice(payload);
        padded.resize(header.payload_len(), 0);
        Ok(Self::new(header, Bytes::from(padded)))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length (padding included).
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the major opcode.
    #[inline]
    pub fn major(&self) -> u8 {
        self.header.major
    }

    /// Get the minor opcode.
    #[inline]
    pub fn minor(&self) -> u8 {
        self.header.minor
    }

    /// Cursor over the payload in the session byte order.
    #[inline]
    pub fn reader(&self, endian: Endian) -> WireReader<'_> {
        WireReader::new(&self.payload, endian)
    }

    /// Leading `u16` of the payload, the session id for most opcodes.
    pub fn imid(&self, endian: Endian) -> Option<u16> {
        self.reader(endian).get_u16().ok()
    }

    /// Second `u16` of the payload, the context id for IC-scoped opcodes.
    pub fn icid(&self, endian: Endian) -> Option<u16> {
        let mut r = self.reader(endian);
        r.get_u16().ok()?;
        r.get_u16().ok()
    }

    /// Serialize header and payload.
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode(endian));
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and appends the payload followed by zero padding up to
/// the next 4-byte boundary.
pub fn build_frame(endian: Endian, major: u8, minor: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let header = Header::for_payload(major, minor, payload.len())?;
    let mut buf = Vec::with_capacity(header.frame_len());
    buf.extend_from_slice(&header.encode(endian));
    buf.extend_from_slice(payload);
    buf.resize(buf.len() + pad(payload.len()), 0);
    Ok(buf)
}
