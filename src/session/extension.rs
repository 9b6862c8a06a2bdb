//! Protocol extensions.
//!
//! Each session copies the compiled-in descriptors into its own
//! [`ExtensionTable`] and fills in the opcodes the server reports. Features
//! check the table before using a private opcode and fall back to the base
//! protocol when the extension is absent.
//!
//! ```text
//! QueryExtension:      imid u16 | bytes u16 | (len u8, name)* | pad
//! QueryExtensionReply: imid u16 | bytes u16 | (major u8, minor u8, len u16, name, pad)*
//! ```

use tracing::debug;

use super::{ReplyMatch, Session};
use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, XimError};
use crate::protocol::{opcodes, Endian, Frame};

pub const EXT_SET_EVENT_MASK: &str = "XIM_EXT_SET_EVENT_MASK";
pub const EXT_FORWARD_KEYEVENT: &str = "XIM_EXT_FORWARD_KEYEVENT";
pub const EXT_MOVE: &str = "XIM_EXT_MOVE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    /// Server-pushed filter/intercept/select masks.
    SetEventMask,
    /// Compact key-event forwarding.
    ForwardKeyEvent,
    /// Repositioning the preedit spot.
    Move,
}

/// One known extension and, once negotiated, its opcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub kind: ExtensionKind,
    pub name: &'static str,
    pub major: u8,
    pub minor: u8,
    pub active: bool,
}

const DESCRIPTORS: [Extension; 3] = [
    Extension {
        kind: ExtensionKind::SetEventMask,
        name: EXT_SET_EVENT_MASK,
        major: opcodes::EXTENSION,
        minor: 0x30,
        active: false,
    },
    Extension {
        kind: ExtensionKind::ForwardKeyEvent,
        name: EXT_FORWARD_KEYEVENT,
        major: opcodes::EXTENSION,
        minor: 0x32,
        active: false,
    },
    Extension {
        kind: ExtensionKind::Move,
        name: EXT_MOVE,
        major: opcodes::EXTENSION,
        minor: 0x33,
        active: false,
    },
];

/// Per-session extension state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTable {
    entries: Vec<Extension>,
}

impl ExtensionTable {
    /// Fresh copy of the descriptors, nothing negotiated.
    pub fn new() -> Self {
        Self {
            entries: DESCRIPTORS.to_vec(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// The extension, if the server supports it.
    pub fn get(&self, kind: ExtensionKind) -> Option<&Extension> {
        self.entries.iter().find(|e| e.kind == kind && e.active)
    }

    pub fn is_active(&self, kind: ExtensionKind) -> bool {
        self.get(kind).is_some()
    }

    /// Mark `name` supported with the server's opcodes; unknown names are ignored.
    pub fn activate(&mut self, name: &str, major: u8, minor: u8) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.major = major;
                entry.minor = minor;
                entry.active = true;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.entries = DESCRIPTORS.to_vec();
    }

    /// Payload asking for every known extension.
    pub fn encode_query(&self, imid: u16, endian: Endian) -> Result<Vec<u8>> {
        let mut w = WireWriter::new(endian);
        w.put_u16(imid);
        let len_at = w.reserve_u16();
        let start = w.len();
        for entry in &self.entries {
            w.put_len_u8(entry.name.len())?;
            w.put_bytes(entry.name.as_bytes());
        }
        let bytes = w.len() - start;
        let len = u16::try_from(bytes).map_err(|_| XimError::PayloadTooLarge(bytes))?;
        w.patch_u16(len_at, len);
        w.pad_to_4();
        Ok(w.freeze().to_vec())
    }

    /// Apply a query reply; returns how many extensions became active.
    pub fn apply_reply(&mut self, payload: &[u8], endian: Endian) -> Result<usize> {
        let mut r = WireReader::new(payload, endian);
        let _imid = r.get_u16()?;
        let bytes = r.get_u16()? as usize;
        let mut list = r.sub_reader(bytes.min(r.remaining()))?;
        let mut count = 0;
        while list.remaining() >= 4 {
            let major = list.get_u8()?;
            let minor = list.get_u8()?;
            let len = list.get_u16()? as usize;
            let name = list.get_bytes(len)?;
            list.skip_pad(len)?;
            let name = String::from_utf8_lossy(name);
            if self.activate(&name, major, minor) {
                debug!(extension = %name, major, minor, "extension supported");
                count += 1;
            }
        }
        Ok(count)
    }
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Ask the server which extensions it supports. An error reply means
    /// none are.
    pub(super) fn query_extensions(&mut self) -> Result<()> {
        self.extensions.reset();
        let imid = self.require_imid("extension query")?;
        let payload = self.extensions.encode_query(imid, self.endian)?;
        let frame = match self.call(
            opcodes::QUERY_EXTENSION,
            &payload,
            ReplyMatch::session(opcodes::QUERY_EXTENSION_REPLY, imid),
        ) {
            Ok(frame) => frame,
            Err(XimError::ServerError(report)) => {
                debug!(%report, "server has no extensions");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.extensions.apply_reply(frame.payload(), self.endian)?;

        self.unregister_handler("ext_set_event_mask");
        if let Some(ext) = self.extensions.get(ExtensionKind::SetEventMask) {
            let (major, minor) = (ext.major, ext.minor);
            self.handlers.register(
                major,
                Some(minor),
                "ext_set_event_mask",
                Session::on_ext_set_event_mask,
            );
        }
        Ok(())
    }

    /// `imid, icid, filter u32, intercept u32, select u32, forward u32, sync u32`
    fn on_ext_set_event_mask(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let imid = r.get_u16()?;
        let icid = r.get_u16()?;
        if Some(imid) != session.imid {
            return Ok(false);
        }
        let Some(handle) = session.contexts.lookup(icid) else {
            return Ok(false);
        };
        let context = session.contexts.get_mut(handle)?;
        let masks = &mut context.core.masks;
        masks.filter = r.get_u32()?;
        masks.intercept = r.get_u32()?;
        masks.select = r.get_u32()?;
        masks.forward = r.get_u32()?;
        masks.sync = r.get_u32()?;
        debug!(context = %handle, ?masks, "extension event masks");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_independent() {
        let mut a = ExtensionTable::new();
        let b = ExtensionTable::new();
        assert!(a.activate(EXT_MOVE, 128, 0x40));
        assert!(a.is_active(ExtensionKind::Move));
        assert!(!b.is_active(ExtensionKind::Move));
        assert_eq!(a.get(ExtensionKind::Move).unwrap().minor, 0x40);
        a.reset();
        assert!(!a.is_active(ExtensionKind::Move));
    }

    #[test]
    fn test_query_layout() {
        let payload = ExtensionTable::new().encode_query(3, Endian::Little).unwrap();
        assert_eq!(&payload[..2], &[3, 0]);
        let bytes = u16::from_le_bytes([payload[2], payload[3]]) as usize;
        assert_eq!(
            bytes,
            3 + EXT_SET_EVENT_MASK.len() + EXT_FORWARD_KEYEVENT.len() + EXT_MOVE.len()
        );
        assert_eq!(payload[4] as usize, EXT_SET_EVENT_MASK.len());
        assert_eq!(payload.len() % 4, 0);
    }

    #[test]
    fn test_apply_reply_ignores_unknown() {
        let mut w = WireWriter::new(Endian::Big);
        w.put_u16(3);
        let len_at = w.reserve_u16();
        for (minor, name) in [(0x33u8, EXT_MOVE), (0x50, "XIM_EXT_UNKNOWN")] {
            w.put_u8(128);
            w.put_u8(minor);
            w.put_u16(name.len() as u16);
            w.put_bytes(name.as_bytes());
            w.pad_to_4();
        }
        let bytes = w.len() - 4;
        w.patch_u16(len_at, bytes as u16);

        let mut table = ExtensionTable::new();
        assert_eq!(table.apply_reply(w.as_slice(), Endian::Big).unwrap(), 1);
        assert!(table.is_active(ExtensionKind::Move));
        assert!(!table.is_active(ExtensionKind::ForwardKeyEvent));
    }
}
