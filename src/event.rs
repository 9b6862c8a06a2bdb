//! Key events and the session's local event queue.
//!
//! Forwarded events carry a 32-byte windowing-event record in the session
//! byte order:
//!
//! ```text
//! type u8 | keycode u8 | sequence u16 | time u32 | root u32 | window u32 |
//! child u32 | root_x i16 | root_y i16 | x i16 | y i16 | state u16 |
//! same_screen u8 | pad u8
//! ```

use crate::codec::{WireReader, WireWriter};
use crate::error::Result;
use crate::handler::ContextHandle;
use crate::protocol::ErrorReport;

pub const KEY_PRESS: u8 = 2;
pub const KEY_RELEASE: u8 = 3;

/// Size of an event record on the wire.
pub const EVENT_RECORD_SIZE: usize = 32;

/// A key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub kind: u8,
    pub keycode: u8,
    pub sequence: u16,
    pub time: u32,
    pub root: u32,
    pub window: u32,
    pub child: u32,
    pub root_x: i16,
    pub root_y: i16,
    pub x: i16,
    pub y: i16,
    pub state: u16,
    pub same_screen: bool,
}

impl KeyEvent {
    pub fn press(window: u32, keycode: u8, state: u16) -> Self {
        Self {
            kind: KEY_PRESS,
            keycode,
            window,
            state,
            same_screen: true,
            ..Self::default()
        }
    }

    pub fn is_press(&self) -> bool {
        self.kind & 0x7f == KEY_PRESS
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.put_u8(self.kind);
        w.put_u8(self.keycode);
        w.put_u16(self.sequence);
        w.put_u32(self.time);
        w.put_u32(self.root);
        w.put_u32(self.window);
        w.put_u32(self.child);
        w.put_i16(self.root_x);
        w.put_i16(self.root_y);
        w.put_i16(self.x);
        w.put_i16(self.y);
        w.put_u16(self.state);
        w.put_u8(self.same_screen as u8);
        w.put_u8(0);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let event = Self {
            kind: r.get_u8()?,
            keycode: r.get_u8()?,
            sequence: r.get_u16()?,
            time: r.get_u32()?,
            root: r.get_u32()?,
            window: r.get_u32()?,
            child: r.get_u32()?,
            root_x: r.get_i16()?,
            root_y: r.get_i16()?,
            x: r.get_i16()?,
            y: r.get_i16()?,
            state: r.get_u16()?,
            same_screen: r.get_u8()? != 0,
        };
        r.skip(1)?;
        Ok(event)
    }
}

/// Something the session hands back to the embedding event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// An event the server sent back to be processed locally.
    Forwarded {
        context: ContextHandle,
        serial: u32,
        event: KeyEvent,
    },
    /// Synthetic key press telling the owner that a commit is waiting in
    /// the context's FIFO (keycode 0).
    CommitReady {
        context: ContextHandle,
        event: KeyEvent,
    },
    /// Unsolicited server error.
    Error(ErrorReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endian;

    #[test]
    fn test_record_is_32_bytes() {
        let mut w = WireWriter::new(Endian::Big);
        KeyEvent::press(0x400001, 38, 1).encode(&mut w);
        assert_eq!(w.len(), EVENT_RECORD_SIZE);
        assert_eq!(&w.as_slice()[..2], &[KEY_PRESS, 38]);
    }

    #[test]
    fn test_decode_record() {
        let mut event = KeyEvent::press(7, 24, 4);
        event.kind = KEY_RELEASE;
        event.time = 1234;
        event.x = -5;
        let mut w = WireWriter::new(Endian::Little);
        event.encode(&mut w);
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Little);
        let decoded = KeyEvent::decode(&mut r).unwrap();
        assert_eq!(decoded, event);
        assert!(!decoded.is_press());
        assert!(r.is_empty());
    }
}
