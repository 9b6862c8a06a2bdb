//! Connection handshake, authentication, and teardown.
//!
//! ```text
//! Connect: byte_order u8 | unused u8 | major u16 | minor u16 | n_auth u16 |
//!          (len u16, name, pad)*
//! Auth*:   len u16 | unused u16 | data | pad
//! ConnectReply: major u16 | minor u16
//! ```

use tracing::{debug, warn};

use super::{ReplyMatch, Session, SessionState};
use crate::codec::WireWriter;
use crate::error::{Result, XimError};
use crate::protocol::{opcodes, ErrorReport, Frame, ProtocolVersion};
use crate::transport::discovery::choose_server;

/// Answer to one authentication round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Send this data back to the server.
    Reply(Vec<u8>),
    /// Give up; the handshake fails with [`XimError::AuthRejected`].
    Reject,
}

/// Client side of the authentication sub-negotiation.
pub trait Authenticator {
    /// Scheme names offered in the connect request.
    fn names(&self) -> Vec<String>;

    /// Respond to a server challenge.
    fn respond(&mut self, challenge: &[u8]) -> AuthStep;
}

impl Session {
    /// Run the full handshake: discovery, connect, open, encoding and
    /// extension negotiation.
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Discover | SessionState::Failed => self.establish(),
            SessionState::Disconnected => self.reconnect(),
            state => Err(XimError::InvalidState {
                state,
                op: "connect",
            }),
        }
    }

    /// Handshake from scratch; on failure the session ends up `Failed`, or
    /// stays `Disconnected` while reconnecting.
    pub(crate) fn establish(&mut self) -> Result<()> {
        let result = self.handshake();
        if let Err(e) = &result {
            warn!(error = %e, "handshake failed");
            self.release();
            let next = if self.reconnecting {
                SessionState::Disconnected
            } else {
                SessionState::Failed
            };
            self.set_state(next);
        }
        result
    }

    fn handshake(&mut self) -> Result<()> {
        self.discover()?;
        self.connect_transport()?;
        self.open()?;
        self.negotiate_encoding()?;
        self.query_extensions()?;
        self.set_state(SessionState::Ready);
        Ok(())
    }

    fn discover(&mut self) -> Result<()> {
        self.set_state(SessionState::Discover);
        if let Some(discovery) = self.discovery.as_mut() {
            let (server, announced) = choose_server(
                discovery.directory.as_mut(),
                self.config.server_name.as_deref(),
                &self.config.locale,
            )?;
            let transport = discovery
                .registry
                .select(&self.config.transport_priority, &announced)?;
            debug!(server = %server, "server chosen");
            self.server = Some(server);
            self.transport = Some(transport);
        } else if self.transport.is_none() {
            return Err(XimError::NoServer(
                "no transport or server directory configured".to_string(),
            ));
        }
        self.set_state(SessionState::TransportChosen);
        Ok(())
    }

    fn connect_transport(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);
        self.reader.clear();
        self.read_capacity = self.config.read_buffer_size;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(XimError::ConnectionClosed)?;
        transport.configure(&self.config);
        transport.connect()?;

        let payload = self.connect_payload()?;
        self.send(opcodes::CONNECT, 0, &payload)?;

        loop {
            let frame = self.read_frame()?;
            match frame.major() {
                opcodes::AUTH_REQUIRED | opcodes::AUTH_NEXT => {
                    self.set_state(SessionState::AuthNegotiating);
                    self.answer_challenge(&frame)?;
                }
                // No more rounds; the connect reply follows.
                opcodes::AUTH_SETUP => {}
                opcodes::AUTH_NG => return Err(XimError::AuthRejected),
                opcodes::CONNECT_REPLY => return self.accept_version(&frame),
                opcodes::ERROR => {
                    let report = ErrorReport::decode(frame.payload(), self.endian)?;
                    return Err(XimError::ServerError(report));
                }
                other => {
                    return Err(XimError::ProtocolViolation(format!(
                        "opcode {} during connect",
                        other
                    )))
                }
            }
        }
    }

    fn connect_payload(&self) -> Result<Vec<u8>> {
        let version = self.config.protocol_version;
        let names = self
            .authenticator
            .as_ref()
            .map(|a| a.names())
            .unwrap_or_default();

        let mut w = WireWriter::new(self.endian);
        w.put_u8(self.endian.tag());
        w.put_u8(0);
        w.put_u16(version.major);
        w.put_u16(version.minor);
        w.put_len_u16(names.len())?;
        for name in &names {
            w.put_string8_u16(name.as_bytes())?;
        }
        Ok(w.freeze().to_vec())
    }

    fn answer_challenge(&mut self, frame: &Frame) -> Result<()> {
        let mut r = frame.reader(self.endian);
        let len = r.get_u16()? as usize;
        r.skip(2)?;
        let challenge = r.get_bytes(len)?.to_vec();

        let step = match self.authenticator.as_mut() {
            Some(auth) => auth.respond(&challenge),
            None => AuthStep::Reject,
        };
        match step {
            AuthStep::Reply(data) => {
                let mut w = WireWriter::new(self.endian);
                w.put_len_u16(data.len())?;
                w.put_u16(0);
                w.put_bytes(&data);
                w.pad_to_4();
                self.send(opcodes::AUTH_REPLY, 0, w.as_slice())
            }
            AuthStep::Reject => {
                debug!("authentication refused locally");
                self.send(opcodes::AUTH_NG, 0, &[])?;
                Err(XimError::AuthRejected)
            }
        }
    }

    fn accept_version(&mut self, frame: &Frame) -> Result<()> {
        let mut r = frame.reader(self.endian);
        let received = ProtocolVersion::new(r.get_u16()?, r.get_u16()?);
        let requested = self.config.protocol_version;
        if received != requested {
            return Err(XimError::VersionMismatch {
                requested,
                received,
            });
        }
        self.version = Some(received);
        self.set_state(SessionState::Connected);
        Ok(())
    }

    /// Drop everything acquired by a failed handshake.
    fn release(&mut self) {
        if let Some(transport) = self.transport.as_deref_mut() {
            transport.shutdown();
        }
        self.reader.clear();
        self.imid = None;
        self.version = None;
        self.encoding = None;
        self.extensions.reset();
    }

    /// Orderly teardown: close the session if open, then
    /// `DISCONNECT -> DISCONNECT_REPLY` and shut the transport down.
    pub fn disconnect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready => self.close()?,
            SessionState::Connected => {}
            SessionState::Disconnected | SessionState::Failed => {
                self.contexts.clear();
                self.set_state(SessionState::Closed);
                return Ok(());
            }
            state => {
                return Err(XimError::InvalidState {
                    state,
                    op: "disconnect",
                })
            }
        }

        let result = self
            .call(
                opcodes::DISCONNECT,
                &[],
                ReplyMatch::connection(opcodes::DISCONNECT_REPLY),
            )
            .map(|_| ());
        if let Some(transport) = self.transport.as_deref_mut() {
            transport.shutdown();
        }
        self.reader.clear();
        self.set_state(SessionState::Closed);
        result
    }
}
