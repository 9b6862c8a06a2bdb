//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns the client end plus a [`MemoryPeer`]
//! handle that plays the server: it sees every frame the client writes and
//! queues the bytes the client will read. An optional responder closure
//! answers each written frame, which is enough to script a whole session.
//!
//! # Example
//!
//! ```
//! use xim_client::protocol::{opcodes, Endian};
//! use xim_client::transport::{MemoryTransport, Transport};
//!
//! let (mut transport, peer) = MemoryTransport::pair(Endian::Little);
//! peer.set_responder(|frame| {
//!     if frame.major() == opcodes::DISCONNECT {
//!         vec![(opcodes::DISCONNECT_REPLY, Vec::new())]
//!     } else {
//!         Vec::new()
//!     }
//! });
//! transport.connect().unwrap();
//! transport.write(&[opcodes::DISCONNECT, 0, 0, 0]).unwrap();
//! assert_eq!(peer.sent().len(), 1);
//! assert_eq!(peer.pending_inbound(), 4);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{Transport, TransportKind};
use crate::error::{Result, XimError};
use crate::protocol::{build_frame, Endian, Frame, FrameBuffer};

/// Server-side reaction to one client frame: `(major, payload)` pairs.
type Responder = Box<dyn FnMut(&Frame) -> Vec<(u8, Vec<u8>)>>;

struct Shared {
    endian: Endian,
    inbound: VecDeque<u8>,
    outbound: FrameBuffer,
    sent: Vec<Frame>,
    responder: Option<Responder>,
    read_chunk: usize,
    connects: usize,
    refuse_connect: bool,
    broken: bool,
}

impl Shared {
    fn queue(&mut self, major: u8, payload: &[u8]) -> Result<()> {
        let bytes = build_frame(self.endian, major, 0, payload)?;
        self.inbound.extend(bytes);
        Ok(())
    }
}

/// Client end of an in-process connection.
pub struct MemoryTransport {
    shared: Rc<RefCell<Shared>>,
    connected: bool,
}

/// Server end of an in-process connection.
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryTransport {
    /// Create a connected pair; `endian` is the byte order the client will announce.
    pub fn pair(endian: Endian) -> (MemoryTransport, MemoryPeer) {
        let shared = Rc::new(RefCell::new(Shared {
            endian,
            inbound: VecDeque::new(),
            outbound: FrameBuffer::new(endian),
            sent: Vec::new(),
            responder: None,
            read_chunk: usize::MAX,
            connects: 0,
            refuse_connect: false,
            broken: false,
        }));
        (
            MemoryTransport {
                shared: shared.clone(),
                connected: false,
            },
            MemoryPeer { shared },
        )
    }
}

impl Transport for MemoryTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    fn connect(&mut self) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        if shared.refuse_connect {
            return Err(XimError::ConnectionClosed);
        }
        shared.connects += 1;
        shared.broken = false;
        shared.outbound.clear();
        self.connected = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.connected = false;
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.connected || self.shared.borrow().broken {
            return Err(XimError::ConnectionClosed);
        }
        let frames = self.shared.borrow_mut().outbound.push(bytes)?;
        for frame in frames {
            // The responder runs without the borrow held so it may use the peer handle.
            let responder = self.shared.borrow_mut().responder.take();
            let replies = match responder {
                Some(mut responder) => {
                    let replies = responder(&frame);
                    self.shared.borrow_mut().responder = Some(responder);
                    replies
                }
                None => Vec::new(),
            };
            let mut shared = self.shared.borrow_mut();
            shared.sent.push(frame);
            for (major, payload) in replies {
                shared.queue(major, &payload)?;
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut shared = self.shared.borrow_mut();
        if !self.connected || shared.broken || shared.inbound.is_empty() {
            return Err(XimError::ConnectionClosed);
        }
        let n = buf.len().min(shared.read_chunk).min(shared.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.connected {
            return Err(XimError::ConnectionClosed);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl MemoryPeer {
    /// Queue raw bytes for the client to read.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.shared.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    /// Queue a frame with minor opcode 0.
    pub fn push_frame(&self, major: u8, payload: &[u8]) -> Result<()> {
        self.shared.borrow_mut().queue(major, payload)
    }

    /// Install a closure that answers every frame the client writes.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Frame) -> Vec<(u8, Vec<u8>)> + 'static,
    {
        self.shared.borrow_mut().responder = Some(Box::new(responder));
    }

    /// Frames written by the client so far.
    pub fn sent(&self) -> Vec<Frame> {
        self.shared.borrow().sent.clone()
    }

    /// Remove and return frames written by the client so far.
    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut self.shared.borrow_mut().sent)
    }

    /// Bytes queued but not yet read by the client.
    pub fn pending_inbound(&self) -> usize {
        self.shared.borrow().inbound.len()
    }

    /// Limit how many bytes a single client read may return.
    pub fn set_read_chunk(&self, n: usize) {
        self.shared.borrow_mut().read_chunk = n.max(1);
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.shared.borrow().connects
    }

    /// Make subsequent `connect` calls fail.
    pub fn refuse_connect(&self, refuse: bool) {
        self.shared.borrow_mut().refuse_connect = refuse;
    }

    /// Drop the link: reads and writes fail until the client reconnects.
    pub fn break_link(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.broken = true;
        shared.inbound.clear();
    }

    pub fn endian(&self) -> Endian {
        self.shared.borrow().endian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::opcodes;

    #[test]
    fn test_read_respects_chunk_size() {
        let (mut transport, peer) = MemoryTransport::pair(Endian::Little);
        transport.connect().unwrap();
        peer.push_inbound(&[1, 2, 3, 4, 5]);
        peer.set_read_chunk(2);
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(peer.pending_inbound(), 3);
    }

    #[test]
    fn test_empty_inbound_reports_closed() {
        let (mut transport, _peer) = MemoryTransport::pair(Endian::Little);
        transport.connect().unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(transport.read(&mut buf), Err(XimError::ConnectionClosed)));
    }

    #[test]
    fn test_responder_sees_whole_frames() {
        let (mut transport, peer) = MemoryTransport::pair(Endian::Big);
        peer.set_responder(|frame| vec![(opcodes::SYNC_REPLY, frame.payload().to_vec())]);
        transport.connect().unwrap();

        let bytes = build_frame(Endian::Big, opcodes::SYNC, 0, &[0, 1, 0, 2]).unwrap();
        transport.write(&bytes[..3]).unwrap();
        assert!(peer.sent().is_empty());
        transport.write(&bytes[3..]).unwrap();
        assert_eq!(peer.sent().len(), 1);
        assert_eq!(peer.pending_inbound(), 8);
    }

    #[test]
    fn test_break_and_refuse() {
        let (mut transport, peer) = MemoryTransport::pair(Endian::Little);
        transport.connect().unwrap();
        peer.break_link();
        assert!(transport.write(&[0; 4]).is_err());
        peer.refuse_connect(true);
        assert!(transport.connect().is_err());
        peer.refuse_connect(false);
        transport.connect().unwrap();
        assert_eq!(peer.connect_count(), 2);
    }
}
