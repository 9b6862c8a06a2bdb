//! Preedit and status callbacks requested by the server.
//!
//! Frames are decoded and handed to the session's [`ImCallbacks`]. Each
//! method returns `None`/`false` when the application does not handle that
//! callback. For the three callbacks that expect a reply (string
//! conversion, preedit start, preedit caret) an unhandled request is
//! answered with `Error(BadSomething)` carrying the opcode.
//!
//! Draw text layout:
//!
//! ```text
//! status u32 | len u16 | string | pad | feedback_bytes u16 | unused u16 | feedback u32*
//! ```

use tracing::{debug, trace};

use super::Session;
use crate::codec::{WireReader, WireWriter};
use crate::error::Result;
use crate::handler::ContextHandle;
use crate::protocol::{opcodes, ErrorCode, ErrorReport, Frame};

const NO_STRING: u32 = 0x0001;
const NO_FEEDBACK: u32 = 0x0002;

/// Status data type carrying text.
const STATUS_TEXT: u32 = 0;
/// Status data type carrying a bitmap.
const STATUS_BITMAP: u32 = 1;

/// Text of a preedit or status draw, in the negotiated encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawText {
    /// `None` when the server flagged "no string".
    pub text: Option<Vec<u8>>,
    pub feedback: Vec<u32>,
}

impl DrawText {
    fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let status = r.get_u32()?;
        let string = r.get_string8_u16()?;
        let text = (status & NO_STRING == 0).then(|| string.to_vec());
        let mut feedback = Vec::new();
        if status & NO_FEEDBACK == 0 && r.remaining() >= 4 {
            let bytes = r.get_u16()? as usize;
            r.skip(2)?;
            let mut list = r.sub_reader(bytes.min(r.remaining()))?;
            while list.remaining() >= 4 {
                feedback.push(list.get_u32()?);
            }
        }
        Ok(Self { text, feedback })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreeditDraw {
    pub caret: i32,
    pub change_first: i32,
    pub change_length: i32,
    pub text: DrawText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretRequest {
    pub position: i32,
    pub direction: u32,
    pub style: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDraw {
    Text(DrawText),
    Bitmap(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringConversionRequest {
    pub position: u16,
    pub direction: u32,
    pub operation: u16,
    pub factor: u16,
}

/// Application hooks for server-driven preedit and status display.
///
/// Every method has a default that declines the callback.
pub trait ImCallbacks {
    fn geometry(&mut self, _context: ContextHandle) -> bool {
        false
    }

    /// Text surrounding the caret, in the negotiated encoding.
    fn string_conversion(
        &mut self,
        _context: ContextHandle,
        _request: &StringConversionRequest,
    ) -> Option<Vec<u8>> {
        None
    }

    /// Returns the maximum preedit length, or `-1` for no limit.
    fn preedit_start(&mut self, _context: ContextHandle) -> Option<i32> {
        None
    }

    fn preedit_draw(&mut self, _context: ContextHandle, _draw: &PreeditDraw) -> bool {
        false
    }

    /// Returns the new caret position.
    fn preedit_caret(&mut self, _context: ContextHandle, _request: &CaretRequest) -> Option<i32> {
        None
    }

    fn preedit_done(&mut self, _context: ContextHandle) -> bool {
        false
    }

    fn status_start(&mut self, _context: ContextHandle) -> bool {
        false
    }

    fn status_draw(&mut self, _context: ContextHandle, _draw: &StatusDraw) -> bool {
        false
    }

    fn status_done(&mut self, _context: ContextHandle) -> bool {
        false
    }

    fn preedit_state(&mut self, _context: ContextHandle, _state: u32) -> bool {
        false
    }

    /// An error the server sent outside of any call.
    fn error(&mut self, _report: &ErrorReport) {}
}

/// Callbacks that decline everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl ImCallbacks for NoCallbacks {}

const CALLBACK_OPCODES: [u8; 10] = [
    opcodes::GEOMETRY,
    opcodes::STR_CONVERSION,
    opcodes::PREEDIT_START,
    opcodes::PREEDIT_DRAW,
    opcodes::PREEDIT_CARET,
    opcodes::PREEDIT_DONE,
    opcodes::STATUS_START,
    opcodes::STATUS_DRAW,
    opcodes::STATUS_DONE,
    opcodes::PREEDITSTATE,
];

impl Session {
    pub(super) fn install_callback_handlers(&mut self) {
        self.handlers.unregister("callback");
        for major in CALLBACK_OPCODES {
            self.handlers
                .register(major, None, "callback", Session::on_callback);
        }
    }

    fn on_callback(session: &mut Session, frame: &Frame) -> Result<bool> {
        let mut r = frame.reader(session.endian);
        let Some((icid, handle)) = session.addressed_context(&mut r)? else {
            return Ok(false);
        };
        let major = frame.major();
        trace!(context = %handle, major, "callback requested");

        let cb = session.callbacks.as_mut();
        match major {
            opcodes::GEOMETRY => {
                cb.geometry(handle);
            }
            opcodes::STR_CONVERSION => {
                let position = r.get_u16()?;
                r.skip(2)?;
                let direction = r.get_u32()?;
                let factor = r.get_u16()?;
                let operation = r.get_u16()?;
                let request = StringConversionRequest {
                    position,
                    direction,
                    operation,
                    factor,
                };
                match cb.string_conversion(handle, &request) {
                    Some(text) => {
                        let mut w = session.reply_writer(icid)?;
                        w.put_string8_u16(&text)?;
                        w.put_u16(0);
                        w.put_u16(0);
                        session.send(opcodes::STR_CONVERSION_REPLY, 0, w.as_slice())?;
                    }
                    None => session.decline_callback(icid, major)?,
                }
            }
            opcodes::PREEDIT_START => match cb.preedit_start(handle) {
                Some(limit) => {
                    let mut w = session.reply_writer(icid)?;
                    w.put_i32(limit);
                    session.send(opcodes::PREEDIT_START_REPLY, 0, w.as_slice())?;
                }
                None => session.decline_callback(icid, major)?,
            },
            opcodes::PREEDIT_DRAW => {
                let draw = PreeditDraw {
                    caret: r.get_i32()?,
                    change_first: r.get_i32()?,
                    change_length: r.get_i32()?,
                    text: DrawText::decode(&mut r)?,
                };
                cb.preedit_draw(handle, &draw);
            }
            opcodes::PREEDIT_CARET => {
                let request = CaretRequest {
                    position: r.get_i32()?,
                    direction: r.get_u32()?,
                    style: r.get_u32()?,
                };
                match cb.preedit_caret(handle, &request) {
                    Some(position) => {
                        let mut w = session.reply_writer(icid)?;
                        w.put_i32(position);
                        session.send(opcodes::PREEDIT_CARET_REPLY, 0, w.as_slice())?;
                    }
                    None => session.decline_callback(icid, major)?,
                }
            }
            opcodes::PREEDIT_DONE => {
                cb.preedit_done(handle);
            }
            opcodes::STATUS_START => {
                cb.status_start(handle);
            }
            opcodes::STATUS_DRAW => {
                let draw = match r.get_u32()? {
                    STATUS_TEXT => StatusDraw::Text(DrawText::decode(&mut r)?),
                    STATUS_BITMAP => StatusDraw::Bitmap(r.get_u32()?),
                    other => {
                        debug!(kind = other, "unknown status data type");
                        return Ok(true);
                    }
                };
                cb.status_draw(handle, &draw);
            }
            opcodes::STATUS_DONE => {
                cb.status_done(handle);
            }
            opcodes::PREEDITSTATE => {
                let state = r.get_u32()?;
                cb.preedit_state(handle, state);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn reply_writer(&self, icid: u16) -> Result<WireWriter> {
        let imid = self.require_imid("callback reply")?;
        let mut w = WireWriter::new(self.endian);
        w.put_u16(imid);
        w.put_u16(icid);
        Ok(w)
    }

    fn decline_callback(&mut self, icid: u16, major: u8) -> Result<()> {
        debug!(major, "no callback registered");
        let mut report = ErrorReport::new(ErrorCode::BadSomething);
        report.imid = self.imid;
        report.icid = Some(icid);
        report.detail_type = major as u16;
        self.send(opcodes::ERROR, 0, &report.encode(self.endian))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endian;

    #[test]
    fn test_draw_text_with_feedback() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_u32(0);
        w.put_string8_u16(b"ka").unwrap();
        w.put_u16(8);
        w.put_u16(0);
        w.put_u32(1);
        w.put_u32(2);
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Little);
        let text = DrawText::decode(&mut r).unwrap();
        assert_eq!(text.text.as_deref(), Some(&b"ka"[..]));
        assert_eq!(text.feedback, vec![1, 2]);
    }

    #[test]
    fn test_draw_text_without_string() {
        let mut w = WireWriter::new(Endian::Big);
        w.put_u32(NO_STRING | NO_FEEDBACK);
        w.put_u16(0);
        w.put_u16(0);
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Big);
        let text = DrawText::decode(&mut r).unwrap();
        assert_eq!(text.text, None);
        assert!(text.feedback.is_empty());
    }
}
