//! Display-relay transport.
//!
//! Frames travel as small fixed-bound messages through the windowing
//! system's inter-client messaging. The host display library supplies the
//! actual messaging as a [`RelayChannel`]; this module only decides how a
//! byte stream maps onto those messages:
//!
//! - up to the message bound: one `Protocol` message
//! - larger, with a side channel: one `Property` packet
//! - larger, without one: `MoreData` chunks followed by a final `Protocol` chunk

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::{Transport, TransportKind};
use crate::config::{ClientConfig, DEFAULT_RELAY_MESSAGE_BOUND};
use crate::error::{Result, XimError};

/// Opcode of an inline relay message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// Last (or only) chunk of a write.
    Protocol,
    /// More chunks of the same write follow.
    MoreData,
}

/// One unit handed to or received from the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPacket {
    Inline { kind: RelayKind, data: Vec<u8> },
    /// Data passed through the auxiliary side channel (a window property).
    Property(Vec<u8>),
}

/// Limits the server announces when the relay opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayLimits {
    /// Largest payload of one inline message; `None` when the server does
    /// not state one.
    pub message_bound: Option<usize>,
    /// Whether large writes may use the side channel.
    pub side_channel: bool,
}

/// Messaging primitives provided by the display library.
pub trait RelayChannel {
    /// Locate the server's communication window and agree on limits.
    fn open(&mut self) -> Result<RelayLimits>;

    fn post(&mut self, packet: RelayPacket) -> Result<()>;

    /// Block until the next client message event arrives.
    ///
    /// `Ok(None)` is an event that is not relay traffic. A display that
    /// goes away is an error.
    fn wait(&mut self) -> Result<Option<RelayPacket>>;

    fn close(&mut self);
}

/// Limits in force on an open relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    bound: usize,
    side_channel: bool,
}

/// Transport over a [`RelayChannel`].
pub struct RelayTransport {
    channel: Box<dyn RelayChannel>,
    /// Used when the server announces no bound of its own.
    fallback_bound: usize,
    link: Option<Link>,
    ready: BytesMut,
    partial: Vec<u8>,
}

impl RelayTransport {
    pub fn new(channel: Box<dyn RelayChannel>) -> Self {
        Self {
            channel,
            fallback_bound: DEFAULT_RELAY_MESSAGE_BOUND,
            link: None,
            ready: BytesMut::new(),
            partial: Vec::new(),
        }
    }

    /// Inline message bound in force, once connected.
    pub fn message_bound(&self) -> Option<usize> {
        self.link.map(|link| link.bound)
    }

    /// Wait for packets until one completes a write from the server.
    fn receive(&mut self) -> Result<()> {
        loop {
            let Some(packet) = self.channel.wait()? else {
                continue;
            };
            match packet {
                RelayPacket::Inline {
                    kind: RelayKind::MoreData,
                    data,
                } => self.partial.extend_from_slice(&data),
                RelayPacket::Inline {
                    kind: RelayKind::Protocol,
                    data,
                }
                | RelayPacket::Property(data) => {
                    self.ready.extend_from_slice(&self.partial);
                    self.partial.clear();
                    self.ready.extend_from_slice(&data);
                    return Ok(());
                }
            }
        }
    }
}

impl Transport for RelayTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Relay
    }

    fn configure(&mut self, config: &ClientConfig) {
        self.fallback_bound = config.relay_message_bound;
    }

    fn connect(&mut self) -> Result<()> {
        let limits = self.channel.open()?;
        let bound = limits.message_bound.unwrap_or(self.fallback_bound);
        if bound == 0 {
            return Err(XimError::ProtocolViolation(
                "relay message bound is zero".to_string(),
            ));
        }
        trace!(bound, side_channel = limits.side_channel, "relay open");
        self.link = Some(Link {
            bound,
            side_channel: limits.side_channel,
        });
        self.ready.clear();
        self.partial.clear();
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.link.take().is_some() {
            self.channel.close();
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let link = self.link.ok_or(XimError::ConnectionClosed)?;
        if bytes.len() <= link.bound {
            return self.channel.post(RelayPacket::Inline {
                kind: RelayKind::Protocol,
                data: bytes.to_vec(),
            });
        }
        if link.side_channel {
            return self.channel.post(RelayPacket::Property(bytes.to_vec()));
        }

        let chunks: Vec<&[u8]> = bytes.chunks(link.bound).collect();
        let last = chunks.len() - 1;
        trace!(chunks = chunks.len(), "fragmenting relay write");
        for (i, chunk) in chunks.into_iter().enumerate() {
            let kind = if i == last {
                RelayKind::Protocol
            } else {
                RelayKind::MoreData
            };
            self.channel.post(RelayPacket::Inline {
                kind,
                data: chunk.to_vec(),
            })?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.link.is_none() {
            return Err(XimError::ConnectionClosed);
        }
        if self.ready.is_empty() {
            self.receive()?;
        }
        let n = buf.len().min(self.ready.len());
        buf[..n].copy_from_slice(&self.ready[..n]);
        self.ready.advance(n);
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Display side of a loopback relay. `None` in `incoming` stands for an
    /// unrelated client event; an empty queue means the display went away.
    #[derive(Default)]
    struct Loopback {
        posted: Vec<RelayPacket>,
        incoming: VecDeque<Option<RelayPacket>>,
        waits: usize,
    }

    struct LoopbackChannel {
        state: Rc<RefCell<Loopback>>,
        limits: RelayLimits,
    }

    impl RelayChannel for LoopbackChannel {
        fn open(&mut self) -> Result<RelayLimits> {
            Ok(self.limits)
        }

        fn post(&mut self, packet: RelayPacket) -> Result<()> {
            self.state.borrow_mut().posted.push(packet);
            Ok(())
        }

        fn wait(&mut self) -> Result<Option<RelayPacket>> {
            let mut state = self.state.borrow_mut();
            state.waits += 1;
            state.incoming.pop_front().ok_or(XimError::ConnectionClosed)
        }

        fn close(&mut self) {}
    }

    fn channel(limits: RelayLimits) -> (RelayTransport, Rc<RefCell<Loopback>>) {
        let state = Rc::new(RefCell::new(Loopback::default()));
        let transport = RelayTransport::new(Box::new(LoopbackChannel {
            state: state.clone(),
            limits,
        }));
        (transport, state)
    }

    fn relay(side_channel: bool) -> (RelayTransport, Rc<RefCell<Loopback>>) {
        let (mut transport, state) = channel(RelayLimits {
            message_bound: Some(20),
            side_channel,
        });
        transport.connect().unwrap();
        (transport, state)
    }

    fn inline(kind: RelayKind, data: &[u8]) -> Option<RelayPacket> {
        Some(RelayPacket::Inline {
            kind,
            data: data.to_vec(),
        })
    }

    #[test]
    fn test_small_write_is_one_message() {
        let (mut transport, state) = relay(false);
        transport.write(&[1u8; 12]).unwrap();
        let posted = &state.borrow().posted;
        assert_eq!(posted.len(), 1);
        assert!(matches!(
            &posted[0],
            RelayPacket::Inline { kind: RelayKind::Protocol, data } if data.len() == 12
        ));
    }

    #[test]
    fn test_large_write_fragments_with_more_data() {
        let (mut transport, state) = relay(false);
        let bytes: Vec<u8> = (0..50).collect();
        transport.write(&bytes).unwrap();

        let posted = &state.borrow().posted;
        assert_eq!(posted.len(), 3);
        let kinds: Vec<RelayKind> = posted
            .iter()
            .map(|p| match p {
                RelayPacket::Inline { kind, .. } => *kind,
                RelayPacket::Property(_) => panic!("unexpected property"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![RelayKind::MoreData, RelayKind::MoreData, RelayKind::Protocol]
        );
    }

    #[test]
    fn test_large_write_uses_side_channel() {
        let (mut transport, state) = relay(true);
        transport.write(&[0u8; 64]).unwrap();
        assert!(matches!(state.borrow().posted[0], RelayPacket::Property(_)));
    }

    #[test]
    fn test_read_reassembles_chunks() {
        let (mut transport, state) = relay(false);
        {
            let mut s = state.borrow_mut();
            s.incoming.push_back(inline(RelayKind::MoreData, &[1, 2, 3]));
            s.incoming.push_back(inline(RelayKind::Protocol, &[4, 5]));
        }
        let mut buf = [0u8; 16];
        assert_eq!(transport.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &[1, 2, 3, 4, 5]);
        // Nothing left and the display is gone.
        assert!(matches!(
            transport.read(&mut buf),
            Err(XimError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_read_waits_past_unrelated_events() {
        let (mut transport, state) = relay(false);
        {
            let mut s = state.borrow_mut();
            s.incoming.push_back(inline(RelayKind::MoreData, &[1, 2]));
            s.incoming.push_back(None);
            s.incoming.push_back(None);
            s.incoming.push_back(inline(RelayKind::Protocol, &[3]));
        }
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(state.borrow().waits, 4);
    }

    #[test]
    fn test_read_serves_buffered_bytes_without_waiting() {
        let (mut transport, state) = relay(false);
        state
            .borrow_mut()
            .incoming
            .push_back(Some(RelayPacket::Property(vec![9; 6])));
        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(state.borrow().waits, 1);
    }

    #[test]
    fn test_configured_bound_applies_without_server_bound() {
        let (mut transport, state) = channel(RelayLimits {
            message_bound: None,
            side_channel: false,
        });
        let config = ClientConfig {
            relay_message_bound: 8,
            ..ClientConfig::default()
        };
        transport.configure(&config);
        transport.connect().unwrap();
        assert_eq!(transport.message_bound(), Some(8));

        transport.write(&[0u8; 20]).unwrap();
        let sizes: Vec<usize> = state
            .borrow()
            .posted
            .iter()
            .map(|p| match p {
                RelayPacket::Inline { data, .. } => data.len(),
                RelayPacket::Property(data) => data.len(),
            })
            .collect();
        assert_eq!(sizes, vec![8, 8, 4]);
    }

    #[test]
    fn test_server_bound_wins_over_configured() {
        let (mut transport, _state) = channel(RelayLimits {
            message_bound: Some(32),
            side_channel: false,
        });
        transport.configure(&ClientConfig {
            relay_message_bound: 8,
            ..ClientConfig::default()
        });
        transport.connect().unwrap();
        assert_eq!(transport.message_bound(), Some(32));
    }

    #[test]
    fn test_default_bound_without_configuration() {
        let (mut transport, _state) = channel(RelayLimits {
            message_bound: None,
            side_channel: false,
        });
        transport.connect().unwrap();
        assert_eq!(transport.message_bound(), Some(DEFAULT_RELAY_MESSAGE_BOUND));
    }

    #[test]
    fn test_zero_bound_is_rejected() {
        let (mut transport, _state) = channel(RelayLimits {
            message_bound: None,
            side_channel: false,
        });
        transport.configure(&ClientConfig {
            relay_message_bound: 0,
            ..ClientConfig::default()
        });
        assert!(matches!(
            transport.connect(),
            Err(XimError::ProtocolViolation(_))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_write_before_connect_fails() {
        let (mut transport, _state) = channel(RelayLimits {
            message_bound: Some(20),
            side_channel: false,
        });
        assert!(transport.write(&[0u8; 4]).is_err());
    }
}
