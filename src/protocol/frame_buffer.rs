//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 4 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! Bytes that arrive after the end of the current frame stay in the buffer
//! and are used first by the next read, so several frames delivered by one
//! transport read are all recovered.
//!
//! # Example
//!
//! ```
//! use xim_client::protocol::{build_frame, Endian, FrameBuffer, opcodes};
//!
//! let bytes = build_frame(Endian::Big, opcodes::CLOSE_REPLY, 0, &[0, 1, 0, 0]).unwrap();
//! let mut buffer = FrameBuffer::new(Endian::Big);
//!
//! // Data arrives in two pieces
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use super::wire_format::{Endian, Header, BUFSIZE, HEADER_SIZE};
use super::Frame;
use crate::error::{Result, XimError};
use crate::transport::Transport;

/// Consecutive empty transport reads tolerated before the link counts as closed.
pub const MAX_EMPTY_READS: usize = 8;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 4 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header, remaining: usize },
}

/// Result of one extraction attempt.
#[derive(Debug)]
enum Extract {
    Frame(Frame),
    NeedMore,
    Overflow(usize),
}

/// Outcome of [`FrameBuffer::read_frame`].
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete frame.
    Frame(Frame),
    /// The next frame needs this many bytes of scratch; nothing was consumed.
    Overflow(usize),
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Byte order of the length field.
    endian: Endian,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new(endian: Endian) -> Self {
        Self {
            buffer: BytesMut::with_capacity(BUFSIZE),
            state: State::WaitingForHeader,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns a vector of complete frames. If data is fragmented,
    /// partial data is buffered internally for the next push.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Extract::Frame(frame) = self.try_extract_one(usize::MAX)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Read the next frame from `transport`, using buffered bytes first.
    ///
    /// When the next frame is larger than `capacity`, returns
    /// `ReadOutcome::Overflow(required)` without consuming anything so the
    /// caller can retry with exactly that much room. A transport read of
    /// zero bytes is retried, up to [`MAX_EMPTY_READS`] times in a row.
    pub fn read_frame(
        &mut self,
        transport: &mut dyn Transport,
        capacity: usize,
    ) -> Result<ReadOutcome> {
        let mut chunk = [0u8; BUFSIZE];
        let mut empty = 0;
        loop {
            match self.try_extract_one(capacity)? {
                Extract::Frame(frame) => return Ok(ReadOutcome::Frame(frame)),
                Extract::Overflow(required) => return Ok(ReadOutcome::Overflow(required)),
                Extract::NeedMore => {
                    let n = transport.read(&mut chunk)?;
                    if n == 0 {
                        empty += 1;
                        if empty >= MAX_EMPTY_READS {
                            debug!(reads = empty, "transport keeps returning nothing");
                            return Err(XimError::ConnectionClosed);
                        }
                        continue;
                    }
                    empty = 0;
                    trace!(bytes = n, "transport read");
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self, capacity: usize) -> Result<Extract> {
        match &self.state {
            State::WaitingForHeader => {
                let header = match Header::decode(&self.buffer, self.endian) {
                    Some(header) => header,
                    None => return Ok(Extract::NeedMore),
                };

                if header.frame_len() > capacity {
                    return Ok(Extract::Overflow(header.frame_len()));
                }

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.length == 0 {
                    return Ok(Extract::Frame(Frame::new(header, Bytes::new())));
                }

                self.state = State::WaitingForPayload {
                    header,
                    remaining: header.payload_len(),
                };

                self.try_extract_one(capacity)
            }

            State::WaitingForPayload { header, remaining } => {
                let remaining = *remaining;
                if self.buffer.len() < remaining {
                    return Ok(Extract::NeedMore);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;
                self.state = State::WaitingForHeader;

                Ok(Extract::Frame(Frame::new(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and reset state, e.g. after the transport is replaced.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, opcodes};
    use crate::transport::{MemoryTransport, Transport, TransportKind};
    use std::collections::VecDeque;

    /// Transport replaying scripted reads; `None` is an empty read.
    struct Scripted {
        reads: VecDeque<Option<Vec<u8>>>,
        calls: usize,
    }

    impl Transport for Scripted {
        fn kind(&self) -> TransportKind {
            TransportKind::Memory
        }

        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn shutdown(&mut self) {}

        fn write(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.calls += 1;
            match self.reads.pop_front() {
                Some(Some(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(None) | None => Ok(0),
            }
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn sample(major: u8, payload: &[u8]) -> Vec<u8> {
        build_frame(Endian::Little, major, 0, payload).unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new(Endian::Little);
        let frames = buffer.push(&sample(opcodes::SYNC_REPLY, &[1, 0, 2, 0])).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].major(), opcodes::SYNC_REPLY);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let bytes = sample(opcodes::COMMIT, b"\x01\x00\x02\x00\x02\x00\x03\x00abc");

        let mut whole = FrameBuffer::new(Endian::Little);
        let expected = whole.push(&bytes).unwrap();

        let mut split = FrameBuffer::new(Endian::Little);
        let mut got = Vec::new();
        for b in &bytes {
            got.extend(split.push(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut bytes = sample(opcodes::SYNC, &[1, 0, 1, 0]);
        bytes.extend(sample(opcodes::SYNC, &[1, 0, 2, 0]));
        bytes.extend(sample(opcodes::DISCONNECT_REPLY, &[]));

        let mut buffer = FrameBuffer::new(Endian::Little);
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].icid(Endian::Little), Some(2));
        assert_eq!(frames[2].payload_len(), 0);
    }

    #[test]
    fn test_partial_header_waits() {
        let bytes = sample(opcodes::SYNC, &[1, 0, 1, 0]);
        let mut buffer = FrameBuffer::new(Endian::Little);
        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert!(matches!(buffer.state, State::WaitingForHeader));
        assert!(buffer.push(&bytes[2..5]).unwrap().is_empty());
        assert!(matches!(buffer.state, State::WaitingForPayload { .. }));
        assert_eq!(buffer.push(&bytes[5..]).unwrap().len(), 1);
    }

    #[test]
    fn test_read_frame_overflow_then_retry() {
        let payload = vec![9u8; 40];
        let bytes = sample(opcodes::GET_IC_VALUES_REPLY, &payload);
        let (mut transport, peer) = MemoryTransport::pair(Endian::Little);
        transport.connect().unwrap();
        peer.push_inbound(&bytes);

        let mut buffer = FrameBuffer::new(Endian::Little);
        match buffer.read_frame(&mut transport, 16).unwrap() {
            ReadOutcome::Overflow(required) => assert_eq!(required, 44),
            other => panic!("expected overflow, got {:?}", other),
        }
        match buffer.read_frame(&mut transport, 44).unwrap() {
            ReadOutcome::Frame(frame) => assert_eq!(frame.payload(), &payload[..]),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_read_frame_keeps_leftover() {
        let mut bytes = sample(opcodes::SYNC, &[7, 0, 1, 0]);
        bytes.extend(sample(opcodes::SYNC, &[7, 0, 2, 0]));
        let (mut transport, peer) = MemoryTransport::pair(Endian::Little);
        transport.connect().unwrap();
        peer.push_inbound(&bytes);

        let mut buffer = FrameBuffer::new(Endian::Little);
        let first = buffer.read_frame(&mut transport, BUFSIZE).unwrap();
        assert!(matches!(first, ReadOutcome::Frame(_)));
        assert_eq!(buffer.len(), 8);
        match buffer.read_frame(&mut transport, BUFSIZE).unwrap() {
            ReadOutcome::Frame(frame) => assert_eq!(frame.icid(Endian::Little), Some(2)),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_reads_are_retried() {
        let bytes = sample(opcodes::SYNC, &[7, 0, 1, 0]);
        let mut transport = Scripted {
            reads: VecDeque::from(vec![
                None,
                Some(bytes[..3].to_vec()),
                None,
                None,
                Some(bytes[3..].to_vec()),
            ]),
            calls: 0,
        };
        let mut buffer = FrameBuffer::new(Endian::Little);
        match buffer.read_frame(&mut transport, BUFSIZE).unwrap() {
            ReadOutcome::Frame(frame) => assert_eq!(frame.major(), opcodes::SYNC),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(transport.calls, 5);
    }

    #[test]
    fn test_endless_empty_reads_close_the_link() {
        let mut transport = Scripted {
            reads: VecDeque::new(),
            calls: 0,
        };
        let mut buffer = FrameBuffer::new(Endian::Little);
        let err = buffer.read_frame(&mut transport, BUFSIZE).unwrap_err();
        assert!(matches!(err, XimError::ConnectionClosed));
        assert_eq!(transport.calls, MAX_EMPTY_READS);
    }

    #[test]
    fn test_clear() {
        let mut buffer = FrameBuffer::new(Endian::Big);
        buffer.push(&[1, 0, 0]).unwrap();
        assert_eq!(buffer.len(), 3);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
