//! Request/reply calls over a stream shared with unsolicited traffic.
//!
//! A call writes its request and then reads frames until one satisfies its
//! [`ReplyMatch`]. Anything else is offered to the dispatch table; a frame
//! nobody claims is answered with `Error(BadProtocol)` and the wait goes on.

use tracing::{debug, trace, warn};

use super::{Session, SessionState};
use crate::error::{Result, XimError};
use crate::protocol::{
    build_frame, opcodes, Endian, ErrorCode, ErrorReport, Frame, ReadOutcome,
};

/// Which frame completes a pending call.
///
/// The reply opcode must match with minor `0`, and so must the session and
/// context ids when given. An `Error` frame completes the call only when its
/// validity flags claim the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplyMatch {
    opcode: u8,
    imid: Option<u16>,
    icid: Option<u16>,
}

impl ReplyMatch {
    /// Reply before a session id exists.
    pub(crate) fn connection(opcode: u8) -> Self {
        Self {
            opcode,
            imid: None,
            icid: None,
        }
    }

    pub(crate) fn session(opcode: u8, imid: u16) -> Self {
        Self {
            opcode,
            imid: Some(imid),
            icid: None,
        }
    }

    pub(crate) fn context(opcode: u8, imid: u16, icid: u16) -> Self {
        Self {
            opcode,
            imid: Some(imid),
            icid: Some(icid),
        }
    }

    pub(crate) fn matches(&self, frame: &Frame, endian: Endian) -> bool {
        if frame.minor() != 0 {
            return false;
        }
        if frame.major() == opcodes::ERROR {
            let Ok(report) = ErrorReport::decode(frame.payload(), endian) else {
                return false;
            };
            return match (self.imid, self.icid) {
                (None, _) => true,
                (Some(imid), None) => report.claims_session(imid),
                (Some(imid), Some(icid)) => report.claims_context(imid, icid),
            };
        }
        if frame.major() != self.opcode {
            return false;
        }
        let Some(imid) = self.imid else {
            return true;
        };
        frame.imid(endian) == Some(imid)
            && self.icid.map_or(true, |icid| frame.icid(endian) == Some(icid))
    }
}

impl Session {
    /// Write one frame and flush it.
    pub(crate) fn send(&mut self, major: u8, minor: u8, payload: &[u8]) -> Result<()> {
        let bytes = build_frame(self.endian, major, minor, payload)?;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(XimError::ConnectionClosed)?;
        trace!(major, minor, len = payload.len(), "frame sent");
        transport.write(&bytes)?;
        transport.flush()
    }

    /// Read the next complete frame, growing the scratch capacity when the
    /// frame announces more than it holds.
    pub(crate) fn read_frame(&mut self) -> Result<Frame> {
        loop {
            let transport = self
                .transport
                .as_deref_mut()
                .ok_or(XimError::ConnectionClosed)?;
            match self.reader.read_frame(transport, self.read_capacity)? {
                ReadOutcome::Frame(frame) => {
                    trace!(
                        major = frame.major(),
                        minor = frame.minor(),
                        len = frame.payload_len(),
                        "frame received"
                    );
                    return Ok(frame);
                }
                ReadOutcome::Overflow(required) => {
                    debug!(required, "growing read buffer");
                    self.read_capacity = required;
                }
            }
        }
    }

    /// Read until `expected` accepts a frame, dispatching everything else.
    pub(crate) fn wait_for(&mut self, expected: &dyn Fn(&Frame) -> bool) -> Result<Frame> {
        loop {
            let frame = self.read_frame()?;
            if expected(&frame) {
                return Ok(frame);
            }
            if !self.dispatch(&frame)? {
                self.reject_unclaimed(&frame)?;
            }
        }
    }

    /// Send a request and wait for its reply; an `Error` reply becomes
    /// [`XimError::ServerError`].
    pub(crate) fn call(&mut self, major: u8, payload: &[u8], reply: ReplyMatch) -> Result<Frame> {
        self.request(major, 0, payload, reply)
    }

    /// [`Session::call`] for requests with a minor opcode.
    pub(crate) fn request(
        &mut self,
        major: u8,
        minor: u8,
        payload: &[u8],
        reply: ReplyMatch,
    ) -> Result<Frame> {
        self.send(major, minor, payload)?;
        self.await_reply(reply)
    }

    pub(crate) fn await_reply(&mut self, reply: ReplyMatch) -> Result<Frame> {
        let endian = self.endian;
        let frame = self.wait_for(&|f| reply.matches(f, endian))?;
        if frame.major() == opcodes::ERROR {
            let report = ErrorReport::decode(frame.payload(), endian)?;
            debug!(%report, "server answered with an error");
            return Err(XimError::ServerError(report));
        }
        Ok(frame)
    }

    /// Offer `frame` to the dispatch table; `Ok(true)` when a handler claimed it.
    ///
    /// A handler that fails to decode its frame counts as declining it;
    /// transport failures propagate.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<bool> {
        for (name, handler) in self.handlers.candidates(frame) {
            match handler(self, frame) {
                Ok(true) => {
                    trace!(handler = name, "frame claimed");
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => warn!(handler = name, error = %e, "handler rejected frame"),
            }
        }
        Ok(false)
    }

    fn reject_unclaimed(&mut self, frame: &Frame) -> Result<()> {
        if frame.major() == opcodes::ERROR {
            warn!("unclaimed error frame dropped");
            return Ok(());
        }
        warn!(
            major = frame.major(),
            minor = frame.minor(),
            "unclaimed frame, answering BadProtocol"
        );
        let mut report = ErrorReport::new(ErrorCode::BadProtocol);
        report.imid = self.imid;
        report.detail_type = frame.major() as u16;
        self.send(opcodes::ERROR, 0, &report.encode(self.endian))
    }

    /// Block for one inbound frame and dispatch it.
    ///
    /// This drains unsolicited traffic (commits, forwarded events, sync
    /// requests) while no call is outstanding.
    pub fn pump(&mut self) -> Result<()> {
        self.guarded("pump", |s| {
            let frame = s.read_frame()?;
            if !s.dispatch(&frame)? {
                s.reject_unclaimed(&frame)?;
            }
            Ok(())
        })
    }

    /// Run `f` on a ready session, recording a transport failure on the way out.
    pub(crate) fn guarded<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.ensure_ready(op)?;
        let result = f(self);
        if let Err(e) = &result {
            if e.is_transport() {
                self.transport_lost(e);
            }
        }
        result
    }

    /// Tear down after the transport failed on a ready session.
    pub(crate) fn transport_lost(&mut self, error: &XimError) {
        if let Some(transport) = self.transport.as_deref_mut() {
            transport.shutdown();
        }
        self.reader.clear();
        self.imid = None;
        if self.state == SessionState::Ready && self.config.reconnectable {
            warn!(error = %error, "transport lost, session kept for reconnect");
            self.contexts.detach_all();
            self.set_state(SessionState::Disconnected);
        } else {
            warn!(error = %error, "transport lost");
            self.set_state(SessionState::Failed);
        }
    }
}
