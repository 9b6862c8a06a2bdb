//! Wire format encoding and decoding.
//!
//! Every message starts with a fixed 4-byte header:
//! ```text
//! ┌───────┬───────┬──────────────────┐
//! │ Major │ Minor │ Length           │
//! │ 1 byte│ 1 byte│ 2 bytes, 4-byte  │
//! │       │       │ units of payload │
//! └───────┴───────┴──────────────────┘
//! ```
//!
//! The payload is zero-padded to a 4-byte boundary. Multi-byte fields use
//! the byte order announced by the client in its `Connect` request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XimError};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Default scratch capacity for one inbound frame.
pub const BUFSIZE: usize = 2048;

/// Largest payload expressible by the 16-bit unit count.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize * 4;

/// Number of zero bytes needed to round `n` up to a 4-byte boundary.
#[inline]
pub fn pad(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// `n` rounded up to a 4-byte boundary.
#[inline]
pub fn padded_len(n: usize) -> usize {
    n + pad(n)
}

/// Byte order of every multi-byte field in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Byte order of the running machine.
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    /// Tag byte carried in the `Connect` request (`1` little, `0` big).
    pub fn tag(self) -> u8 {
        match self {
            Endian::Little => 1,
            Endian::Big => 0,
        }
    }

    /// Parse a `Connect` tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Endian::Little),
            0 => Some(Endian::Big),
            _ => None,
        }
    }

    #[inline]
    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn read_u16(self, b: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }
}

/// Negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const V1_0: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V1_0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Major opcodes.
pub mod opcodes {
    pub const CONNECT: u8 = 1;
    pub const CONNECT_REPLY: u8 = 2;
    pub const DISCONNECT: u8 = 3;
    pub const DISCONNECT_REPLY: u8 = 4;

    pub const AUTH_REQUIRED: u8 = 10;
    pub const AUTH_REPLY: u8 = 11;
    pub const AUTH_NEXT: u8 = 12;
    pub const AUTH_SETUP: u8 = 13;
    pub const AUTH_NG: u8 = 14;

    pub const ERROR: u8 = 20;

    pub const OPEN: u8 = 30;
    pub const OPEN_REPLY: u8 = 31;
    pub const CLOSE: u8 = 32;
    pub const CLOSE_REPLY: u8 = 33;
    pub const REGISTER_TRIGGERKEYS: u8 = 34;
    pub const TRIGGER_NOTIFY: u8 = 35;
    pub const TRIGGER_NOTIFY_REPLY: u8 = 36;
    pub const SET_EVENT_MASK: u8 = 37;
    pub const ENCODING_NEGOTIATION: u8 = 38;
    pub const ENCODING_NEGOTIATION_REPLY: u8 = 39;
    pub const QUERY_EXTENSION: u8 = 40;
    pub const QUERY_EXTENSION_REPLY: u8 = 41;
    pub const SET_IM_VALUES: u8 = 42;
    pub const SET_IM_VALUES_REPLY: u8 = 43;
    pub const GET_IM_VALUES: u8 = 44;
    pub const GET_IM_VALUES_REPLY: u8 = 45;

    pub const CREATE_IC: u8 = 50;
    pub const CREATE_IC_REPLY: u8 = 51;
    pub const DESTROY_IC: u8 = 52;
    pub const DESTROY_IC_REPLY: u8 = 53;
    pub const SET_IC_VALUES: u8 = 54;
    pub const SET_IC_VALUES_REPLY: u8 = 55;
    pub const GET_IC_VALUES: u8 = 56;
    pub const GET_IC_VALUES_REPLY: u8 = 57;
    pub const SET_IC_FOCUS: u8 = 58;
    pub const UNSET_IC_FOCUS: u8 = 59;
    pub const FORWARD_EVENT: u8 = 60;
    pub const SYNC: u8 = 61;
    pub const SYNC_REPLY: u8 = 62;
    pub const COMMIT: u8 = 63;
    pub const RESET_IC: u8 = 64;
    pub const RESET_IC_REPLY: u8 = 65;

    pub const GEOMETRY: u8 = 70;
    pub const STR_CONVERSION: u8 = 71;
    pub const STR_CONVERSION_REPLY: u8 = 72;
    pub const PREEDIT_START: u8 = 73;
    pub const PREEDIT_START_REPLY: u8 = 74;
    pub const PREEDIT_DRAW: u8 = 75;
    pub const PREEDIT_CARET: u8 = 76;
    pub const PREEDIT_CARET_REPLY: u8 = 77;
    pub const PREEDIT_DONE: u8 = 78;
    pub const STATUS_START: u8 = 79;
    pub const STATUS_DRAW: u8 = 80;
    pub const STATUS_DONE: u8 = 81;
    pub const PREEDITSTATE: u8 = 82;

    /// First opcode reserved for negotiated extensions.
    pub const EXTENSION: u8 = 128;
}

/// Flag constants carried in payloads.
pub mod flags {
    /// `Error` frame: the session id field is meaningful.
    pub const IMID_VALID: u16 = 0x0001;
    /// `Error` frame: the context id field is meaningful.
    pub const ICID_VALID: u16 = 0x0002;

    /// `ForwardEvent`/`Commit`: sender waits for a sync reply.
    pub const SYNCHRONOUS: u16 = 0x0001;
    /// `ForwardEvent`: server asks the client to filter the event.
    pub const REQUEST_FILTERING: u16 = 0x0002;
    /// `ForwardEvent`: server asks the client to look the event up.
    pub const REQUEST_LOOKUPSTRING: u16 = 0x0004;

    /// `Commit`: carries a string.
    pub const LOOKUP_CHARS: u16 = 0x0002;
    /// `Commit`: carries a key symbol.
    pub const LOOKUP_KEYSYM: u16 = 0x0004;
    /// `Commit`: carries both.
    pub const LOOKUP_BOTH: u16 = LOOKUP_CHARS | LOOKUP_KEYSYM;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u16, flag: u16) -> bool {
        flags & flag != 0
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Major opcode.
    pub major: u8,
    /// Minor opcode (0 unless an extension says otherwise).
    pub minor: u8,
    /// Payload length in 4-byte units, padding included.
    pub length: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(major: u8, minor: u8, length: u16) -> Self {
        Self {
            major,
            minor,
            length,
        }
    }

    /// Header for an unpadded payload of `payload_len` bytes.
    pub fn for_payload(major: u8, minor: u8, payload_len: usize) -> Result<Self> {
        let total = padded_len(payload_len);
        if total > MAX_PAYLOAD_SIZE {
            return Err(XimError::PayloadTooLarge(payload_len));
        }
        Ok(Self::new(major, minor, (total / 4) as u16))
    }

    /// Payload bytes that follow this header.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.length as usize * 4
    }

    /// Header plus payload.
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use xim_client::protocol::{Endian, Header, opcodes};
    ///
    /// let header = Header::new(opcodes::OPEN, 0, 3);
    /// let bytes = header.encode(Endian::Big);
    /// assert_eq!(bytes, [30, 0, 0, 3]);
    /// ```
    pub fn encode(&self, endian: Endian) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf, endian);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (4 bytes).
    pub fn encode_into(&self, buf: &mut [u8], endian: Endian) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.major;
        buf[1] = self.minor;
        buf[2..4].copy_from_slice(&endian.u16_bytes(self.length));
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8], endian: Endian) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            major: buf[0],
            minor: buf[1],
            length: endian.read_u16([buf[2], buf[3]]),
        })
    }
}

/// Store a header for an already padded payload and return the full frame length.
///
/// `payload_len` must be a multiple of four; the length field holds
/// `payload_len / 4`.
pub fn write_header(
    buf: &mut [u8],
    major: u8,
    minor: u8,
    payload_len: usize,
    endian: Endian,
) -> usize {
    debug_assert_eq!(payload_len % 4, 0);
    Header::new(major, minor, (payload_len / 4) as u16).encode_into(buf, endian);
    payload_len + HEADER_SIZE
}

/// Read the unit count from a buffered header.
///
/// Fails with `Truncated` when fewer than `HEADER_SIZE` bytes are available.
pub fn peek_declared_length(buf: &[u8], available: usize, endian: Endian) -> Result<u16> {
    if available < HEADER_SIZE || buf.len() < HEADER_SIZE {
        return Err(XimError::Truncated);
    }
    Ok(endian.read_u16([buf[2], buf[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        for endian in [Endian::Little, Endian::Big] {
            let original = Header::new(opcodes::CREATE_IC, 0, 0x0102);
            let decoded = Header::decode(&original.encode(endian), endian).unwrap();
            assert_eq!(original, decoded);
        }
    }

    #[test]
    fn test_header_byte_order() {
        let header = Header::new(1, 2, 0x0304);
        assert_eq!(header.encode(Endian::Big), [1, 2, 0x03, 0x04]);
        assert_eq!(header.encode(Endian::Little), [1, 2, 0x04, 0x03]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[1, 0, 0], Endian::Little).is_none());
    }

    #[test]
    fn test_write_header_returns_total_len() {
        let mut buf = [0u8; 4];
        let total = write_header(&mut buf, opcodes::SYNC, 0, 8, Endian::Little);
        assert_eq!(total, 12);
        assert_eq!(buf, [opcodes::SYNC, 0, 2, 0]);
    }

    #[test]
    fn test_peek_declared_length() {
        let buf = [opcodes::OPEN_REPLY, 0, 0, 5];
        assert_eq!(peek_declared_length(&buf, 4, Endian::Big).unwrap(), 5);
        assert!(matches!(
            peek_declared_length(&buf, 3, Endian::Big),
            Err(XimError::Truncated)
        ));
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad(0), 0);
        assert_eq!(pad(1), 3);
        assert_eq!(pad(2), 2);
        assert_eq!(pad(3), 1);
        assert_eq!(pad(4), 0);
        assert_eq!(padded_len(13), 16);
    }

    #[test]
    fn test_for_payload_rounds_up() {
        let header = Header::for_payload(opcodes::OPEN, 0, 13).unwrap();
        assert_eq!(header.length, 4);
        assert_eq!(header.payload_len(), 16);
        assert_eq!(header.frame_len(), 20);
    }

    #[test]
    fn test_for_payload_rejects_oversize() {
        let result = Header::for_payload(opcodes::OPEN, 0, MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(result, Err(XimError::PayloadTooLarge(_))));
    }

    #[test]
    fn test_endian_tag() {
        assert_eq!(Endian::Little.tag(), 1);
        assert_eq!(Endian::Big.tag(), 0);
        assert_eq!(Endian::from_tag(1), Some(Endian::Little));
        assert_eq!(Endian::from_tag(7), None);
    }

    #[test]
    fn test_flags_has_flag() {
        assert!(flags::has_flag(flags::LOOKUP_BOTH, flags::LOOKUP_CHARS));
        assert!(!flags::has_flag(flags::IMID_VALID, flags::ICID_VALID));
    }
}
