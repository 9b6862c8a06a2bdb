//! Standing handlers for server-initiated frames.
//!
//! ```text
//! SetEventMask:        imid | icid | forward u32 | sync u32
//! ForwardEvent:        imid | icid | flag u16 | serial_hi u16 | event[32]
//! Commit:              imid | icid | flag u16 | chars and/or keysym
//! Sync:                imid | icid
//! RegisterTriggerKeys: imid | unused u16 | on_bytes u32 | triggers | off_bytes u32 | triggers
//! ```

use tracing::{debug, trace};

use super::Session;
use crate::attr::HotKeyTrigger;
use crate::codec::{WireReader, WireWriter};
use crate::encoding::EncodedText;
use crate::error::Result;
use crate::event::{KeyEvent, LocalEvent};
use crate::handler::{CommitRecord, ContextHandle};
use crate::protocol::{flags, opcodes, ErrorReport, Frame};

const STANDING: [&str; 6] = [
    "set_event_mask",
    "forward_event",
    "commit",
    "sync",
    "error",
    "register_triggerkeys",
];

impl Session {
    /// (Re)install the handlers every open session carries.
    pub(super) fn install_handlers(&mut self) {
        for name in STANDING {
            self.handlers.unregister(name);
        }
        self.handlers.register(
            opcodes::SET_EVENT_MASK,
            None,
            "set_event_mask",
            Session::on_set_event_mask,
        );
        self.handlers.register(
            opcodes::FORWARD_EVENT,
            None,
            "forward_event",
            Session::on_forward_event,
        );
        self.handlers
            .register(opcodes::COMMIT, None, "commit", Session::on_commit);
        self.handlers
            .register(opcodes::SYNC, None, "sync", Session::on_sync);
        self.handlers
            .register(opcodes::ERROR, None, "error", Session::on_error);
        self.handlers.register(
            opcodes::REGISTER_TRIGGERKEYS,
            None,
            "register_triggerkeys",
            Session::on_register_triggerkeys,
        );
        self.install_callback_handlers();
    }

    /// Context addressed by a frame's leading `imid, icid`, if it is ours.
    pub(super) fn addressed_context(
        &self,
        r: &mut WireReader<'_>,
    ) -> Result<Option<(u16, ContextHandle)>> {
        let imid = r.get_u16()?;
        let icid = r.get_u16()?;
        if Some(imid) != self.imid {
            return Ok(None);
        }
        Ok(self.contexts.lookup(icid).map(|handle| (icid, handle)))
    }

    pub(super) fn send_sync_reply(&mut self, icid: u16) -> Result<()> {
        let imid = self.require_imid("sync reply")?;
        let mut w = WireWriter::new(self.endian);
        w.put_u16(imid);
        w.put_u16(icid);
        self.send(opcodes::SYNC_REPLY, 0, w.as_slice())
    }

    fn on_set_event_mask(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let imid = r.get_u16()?;
        let icid = r.get_u16()?;
        if Some(imid) != session.imid {
            return Ok(false);
        }
        let forward = r.get_u32()?;
        let sync = r.get_u32()?;

        if icid == 0 {
            session.default_masks.forward = forward;
            session.default_masks.sync = sync;
            debug!(forward, sync, "session event masks");
            return Ok(true);
        }
        let Some(handle) = session.contexts.lookup(icid) else {
            return Ok(false);
        };
        let masks = &mut session.contexts.get_mut(handle)?.core.masks;
        masks.forward = forward;
        masks.sync = sync;
        masks.select = masks.forward | masks.filter;
        debug!(context = %handle, forward, sync, "context event masks");
        Ok(true)
    }

    fn on_forward_event(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let Some((icid, handle)) = session.addressed_context(&mut r)? else {
            return Ok(false);
        };
        let flag = r.get_u16()?;
        let serial_hi = r.get_u16()?;
        let event = KeyEvent::decode(&mut r)?;
        let serial = ((serial_hi as u32) << 16) | event.sequence as u32;

        trace!(context = %handle, keycode = event.keycode, "event forwarded back");
        session.events.push_back(LocalEvent::Forwarded {
            context: handle,
            serial,
            event,
        });
        if flags::has_flag(flag, flags::SYNCHRONOUS) {
            session.send_sync_reply(icid)?;
        }
        Ok(true)
    }

    fn on_commit(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let Some((icid, handle)) = session.addressed_context(&mut r)? else {
            return Ok(false);
        };
        let flag = r.get_u16()?;
        let chars = flags::has_flag(flag, flags::LOOKUP_CHARS);
        let keysym = flags::has_flag(flag, flags::LOOKUP_KEYSYM);

        let mut record = CommitRecord {
            text: None,
            keysym: None,
        };
        if keysym {
            r.skip(2)?;
            record.keysym = Some(r.get_u32()?);
        }
        if chars {
            let bytes = r.get_string8_u16()?.to_vec();
            record.text = Some(EncodedText::new(session.text_encoding(), bytes));
        }

        let context = session.contexts.get_mut(handle)?;
        context.core.push_commit(record);
        let window = context.core.focus_window.unwrap_or(0);
        debug!(context = %handle, chars, keysym, "commit queued");

        if flags::has_flag(flag, flags::SYNCHRONOUS) {
            session.send_sync_reply(icid)?;
        }
        session.events.push_back(LocalEvent::CommitReady {
            context: handle,
            event: KeyEvent::press(window, 0, 0),
        });
        Ok(true)
    }

    fn on_sync(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let imid = r.get_u16()?;
        let icid = r.get_u16()?;
        if Some(imid) != session.imid {
            return Ok(false);
        }
        trace!(icid, "sync requested");
        session.send_sync_reply(icid)?;
        Ok(true)
    }

    fn on_error(session: &mut Session, frame: &Frame) -> Result<bool> {
        let report = ErrorReport::decode(frame.payload(), session.endian)?;
        if report.imid.is_some() && report.imid != session.imid {
            return Ok(false);
        }
        debug!(%report, "server error");
        session.callbacks.error(&report);
        session.events.push_back(LocalEvent::Error(report));
        Ok(true)
    }

    fn on_register_triggerkeys(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let imid = r.get_u16()?;
        if Some(imid) != session.imid {
            return Ok(false);
        }
        if session.dynamic_flow {
            return Ok(true);
        }
        r.skip(2)?;
        let on = read_triggers(&mut r)?;
        let off = read_triggers(&mut r)?;
        debug!(on = on.len(), off = off.len(), "trigger keys registered");
        session.triggers.on = on;
        session.triggers.off = off;
        session.dynamic_flow = true;
        Ok(true)
    }
}

fn read_triggers(r: &mut WireReader<'_>) -> Result<Vec<HotKeyTrigger>> {
    let bytes = r.get_u32()? as usize;
    let mut list = r.sub_reader(bytes)?;
    let mut out = Vec::with_capacity(bytes / 12);
    while list.remaining() >= 12 {
        out.push(HotKeyTrigger {
            keysym: list.get_u32()?,
            modifier: list.get_u32()?,
            modifier_mask: list.get_u32()?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endian;

    #[test]
    fn test_read_triggers() {
        let mut w = WireWriter::new(Endian::Big);
        w.put_u32(24);
        for (keysym, modifier) in [(0x20u32, 4u32), (0xff2a, 0)] {
            w.put_u32(keysym);
            w.put_u32(modifier);
            w.put_u32(modifier);
        }
        w.put_u32(0);
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Big);
        let on = read_triggers(&mut r).unwrap();
        let off = read_triggers(&mut r).unwrap();
        assert_eq!(on.len(), 2);
        assert_eq!(on[1].keysym, 0xff2a);
        assert!(off.is_empty());
        assert!(r.is_empty());
    }
}
