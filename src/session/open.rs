//! Session open/close and encoding negotiation.
//!
//! ```text
//! Open:      len u8 | locale | pad
//! OpenReply: imid u16 | im_bytes u16 | im entries | ic_bytes u16 | unused u16 | ic entries
//! Close:     imid u16 | unused u16
//! ```

use tracing::debug;

use super::{ReplyMatch, Session, SessionState};
use crate::attr::{Level, ModeMap, Schema};
use crate::codec::WireWriter;
use crate::encoding;
use crate::error::{Result, XimError};
use crate::protocol::opcodes;

impl Session {
    pub(super) fn open(&mut self) -> Result<()> {
        self.set_state(SessionState::Opening);

        let locale = self.config.locale.as_bytes();
        let len = u8::try_from(locale.len()).map_err(|_| {
            XimError::ProtocolViolation(format!("locale name of {} bytes", locale.len()))
        })?;
        let mut w = WireWriter::new(self.endian);
        w.put_u8(len);
        w.put_bytes(locale);
        w.pad_to_4();
        let payload = w.freeze();

        let frame = self.call(
            opcodes::OPEN,
            &payload,
            ReplyMatch::connection(opcodes::OPEN_REPLY),
        )?;
        let mut r = frame.reader(self.endian);
        let imid = r.get_u16()?;
        let im_bytes = r.get_u16()? as usize;
        let im_entries = Schema::parse_entries(&mut r, im_bytes)?;
        let ic_bytes = r.get_u16()? as usize;
        r.skip(2)?;
        let ic_entries = Schema::parse_entries(&mut r, ic_bytes)?;

        debug!(
            imid,
            im_attributes = im_entries.len(),
            ic_attributes = ic_entries.len(),
            "session opened"
        );
        self.imid = Some(imid);
        self.im_schema = Schema::new(Level::Im, im_entries);
        self.ic_schema = Schema::new(Level::Ic, ic_entries);
        self.im_modes = ModeMap::for_im();
        self.install_handlers();
        Ok(())
    }

    pub(super) fn negotiate_encoding(&mut self) -> Result<()> {
        self.set_state(SessionState::EncodingNegotiating);
        let imid = self.require_imid("encoding negotiation")?;
        let names = encoding::proposal(&self.config.encodings, &self.config.locale);
        let payload = encoding::encode_request(imid, &names, self.endian)?;
        let frame = self.call(
            opcodes::ENCODING_NEGOTIATION,
            &payload,
            ReplyMatch::session(opcodes::ENCODING_NEGOTIATION_REPLY, imid),
        )?;
        let chosen = encoding::decode_reply(frame.payload(), self.endian, &names)?;
        debug!(encoding = %chosen, "encoding negotiated");
        self.encoding = Some(chosen);
        Ok(())
    }

    /// Close the session, dropping every context; the transport stays
    /// connected.
    pub fn close(&mut self) -> Result<()> {
        self.guarded("close", |s| {
            let imid = s.require_imid("close")?;
            let mut w = WireWriter::new(s.endian);
            w.put_u16(imid);
            w.put_u16(0);
            let payload = w.freeze();
            let result = s.call(
                opcodes::CLOSE,
                &payload,
                ReplyMatch::session(opcodes::CLOSE_REPLY, imid),
            );
            s.contexts.clear();
            s.imid = None;
            s.set_state(SessionState::Connected);
            result.map(|_| ())
        })
    }
}
