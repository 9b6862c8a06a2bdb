//! Text encoding negotiation.
//!
//! The client proposes encodings by name, the server picks one by index
//! (or `-1` for the built-in default, compound text). Committed text is
//! kept as raw bytes tagged with the negotiated encoding; conversion is the
//! embedding layer's business, except for the trivially decodable cases.

use std::fmt;

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, XimError};
use crate::protocol::Endian;

pub const COMPOUND_TEXT: &str = "COMPOUND_TEXT";
pub const UTF8: &str = "UTF-8";

/// Negotiated encoding of text exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    CompoundText,
    Utf8,
    Other(String),
}

impl TextEncoding {
    pub fn from_name(name: &str) -> Self {
        match normalize(name).as_str() {
            COMPOUND_TEXT => TextEncoding::CompoundText,
            UTF8 => TextEncoding::Utf8,
            _ => TextEncoding::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TextEncoding::CompoundText => COMPOUND_TEXT,
            TextEncoding::Utf8 => UTF8,
            TextEncoding::Other(name) => name,
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "UTF8" | "UTF-8" => UTF8.to_string(),
        "COMPOUND_TEXT" | "COMPOUND-TEXT" => COMPOUND_TEXT.to_string(),
        _ => upper,
    }
}

/// Text in the negotiated encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedText {
    pub encoding: TextEncoding,
    pub bytes: Vec<u8>,
}

impl EncodedText {
    pub fn new(encoding: TextEncoding, bytes: Vec<u8>) -> Self {
        Self { encoding, bytes }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// UTF-8 view for encodings that need no conversion tables.
    ///
    /// Compound text is only accepted when it stays in its ASCII initial state.
    pub fn to_utf8(&self) -> Option<String> {
        match self.encoding {
            TextEncoding::Utf8 => String::from_utf8(self.bytes.clone()).ok(),
            TextEncoding::CompoundText => {
                if self.bytes.iter().all(|b| b.is_ascii() && *b != 0x1b) {
                    String::from_utf8(self.bytes.clone()).ok()
                } else {
                    None
                }
            }
            TextEncoding::Other(_) => None,
        }
    }
}

/// Names to propose: the configured list, or the locale's codeset
/// followed by compound text.
pub fn proposal(configured: &[String], locale: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut add = |name: String| {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    };
    if configured.is_empty() {
        if let Some((_, codeset)) = locale.split_once('.') {
            let codeset = codeset.split('@').next().unwrap_or(codeset);
            add(normalize(codeset));
        }
        add(COMPOUND_TEXT.to_string());
    } else {
        for name in configured {
            add(name.clone());
        }
    }
    names
}

/// Payload of an encoding-negotiation request.
pub fn encode_request(imid: u16, names: &[String], endian: Endian) -> Result<Vec<u8>> {
    let mut w = WireWriter::new(endian);
    w.put_u16(imid);
    let len_at = w.reserve_u16();
    let start = w.len();
    for name in names {
        w.put_len_u8(name.len())?;
        w.put_bytes(name.as_bytes());
    }
    let bytes = w.len() - start;
    let len = u16::try_from(bytes).map_err(|_| XimError::PayloadTooLarge(bytes))?;
    w.patch_u16(len_at, len);
    w.pad_to_4();
    // no detail list
    w.put_u16(0);
    w.put_u16(0);
    Ok(w.freeze().to_vec())
}

/// Category of the server's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Name,
    Detail,
}

/// Decode the reply and map the chosen index onto the proposal.
pub fn decode_reply(payload: &[u8], endian: Endian, names: &[String]) -> Result<TextEncoding> {
    let mut r = WireReader::new(payload, endian);
    let _imid = r.get_u16()?;
    let category = match r.get_u16()? {
        0 => Category::Name,
        1 => Category::Detail,
        other => {
            return Err(XimError::ProtocolViolation(format!(
                "unknown encoding category {}",
                other
            )))
        }
    };
    let index = r.get_i16()?;
    if index < 0 {
        return Ok(TextEncoding::CompoundText);
    }
    if category == Category::Detail {
        // No details are ever proposed.
        return Err(XimError::ProtocolViolation(
            "server selected an encoding detail".to_string(),
        ));
    }
    names
        .get(index as usize)
        .map(|name| TextEncoding::from_name(name))
        .ok_or_else(|| {
            XimError::ProtocolViolation(format!("encoding index {} out of range", index))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_from_locale() {
        assert_eq!(proposal(&[], "en_US.UTF-8"), vec!["UTF-8", "COMPOUND_TEXT"]);
        assert_eq!(proposal(&[], "C"), vec!["COMPOUND_TEXT"]);
        assert_eq!(
            proposal(&["COMPOUND_TEXT".to_string()], "ja_JP.eucJP"),
            vec!["COMPOUND_TEXT"]
        );
    }

    #[test]
    fn test_request_layout() {
        let payload = encode_request(7, &["UTF-8".to_string()], Endian::Little).unwrap();
        assert_eq!(
            payload,
            vec![7, 0, 6, 0, 5, b'U', b'T', b'F', b'-', b'8', 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_request_rejects_oversize_name() {
        let name = "X".repeat(300);
        assert!(matches!(
            encode_request(7, &[name], Endian::Little),
            Err(XimError::PayloadTooLarge(300))
        ));
    }

    #[test]
    fn test_reply_selects_index_or_default() {
        let names = vec!["UTF-8".to_string(), "COMPOUND_TEXT".to_string()];
        let reply = [7, 0, 0, 0, 1, 0, 0, 0];
        assert_eq!(
            decode_reply(&reply, Endian::Little, &names).unwrap(),
            TextEncoding::CompoundText
        );
        let reply = [7, 0, 0, 0, 0xff, 0xff, 0, 0];
        assert_eq!(
            decode_reply(&reply, Endian::Little, &names).unwrap(),
            TextEncoding::CompoundText
        );
        let reply = [7, 0, 0, 0, 5, 0, 0, 0];
        assert!(decode_reply(&reply, Endian::Little, &names).is_err());
    }

    #[test]
    fn test_to_utf8() {
        let text = EncodedText::new(TextEncoding::CompoundText, b"abc".to_vec());
        assert_eq!(text.to_utf8().as_deref(), Some("abc"));
        let text = EncodedText::new(TextEncoding::CompoundText, vec![0x1b, 0x24, 0x29, 0x41]);
        assert!(text.to_utf8().is_none());
        let text = EncodedText::new(TextEncoding::Utf8, "日本".as_bytes().to_vec());
        assert_eq!(text.to_utf8().as_deref(), Some("日本"));
    }
}
