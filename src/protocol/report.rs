//! `Error` frame payload.
//!
//! ```text
//! imid u16 | icid u16 | flag u16 | code u16 | detail_len u16 | detail_type u16 | detail | pad
//! ```
//! `flag` says which of the two ids are meaningful.

use std::fmt;

use crate::codec::{WireReader, WireWriter};
use crate::error::Result;

use super::wire_format::{flags, Endian};

/// Error codes carried in `Error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadAlloc,
    BadStyle,
    BadClientWindow,
    BadFocusWindow,
    BadArea,
    BadSpotLocation,
    BadColormap,
    BadAtom,
    BadPixel,
    BadPixmap,
    BadName,
    BadCursor,
    BadProtocol,
    BadForeground,
    BadBackground,
    LocaleNotSupported,
    BadSomething,
    Other(u16),
}

impl ErrorCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => ErrorCode::BadAlloc,
            2 => ErrorCode::BadStyle,
            3 => ErrorCode::BadClientWindow,
            4 => ErrorCode::BadFocusWindow,
            5 => ErrorCode::BadArea,
            6 => ErrorCode::BadSpotLocation,
            7 => ErrorCode::BadColormap,
            8 => ErrorCode::BadAtom,
            9 => ErrorCode::BadPixel,
            10 => ErrorCode::BadPixmap,
            11 => ErrorCode::BadName,
            12 => ErrorCode::BadCursor,
            13 => ErrorCode::BadProtocol,
            14 => ErrorCode::BadForeground,
            15 => ErrorCode::BadBackground,
            16 => ErrorCode::LocaleNotSupported,
            999 => ErrorCode::BadSomething,
            other => ErrorCode::Other(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::BadAlloc => 1,
            ErrorCode::BadStyle => 2,
            ErrorCode::BadClientWindow => 3,
            ErrorCode::BadFocusWindow => 4,
            ErrorCode::BadArea => 5,
            ErrorCode::BadSpotLocation => 6,
            ErrorCode::BadColormap => 7,
            ErrorCode::BadAtom => 8,
            ErrorCode::BadPixel => 9,
            ErrorCode::BadPixmap => 10,
            ErrorCode::BadName => 11,
            ErrorCode::BadCursor => 12,
            ErrorCode::BadProtocol => 13,
            ErrorCode::BadForeground => 14,
            ErrorCode::BadBackground => 15,
            ErrorCode::LocaleNotSupported => 16,
            ErrorCode::BadSomething => 999,
            ErrorCode::Other(code) => code,
        }
    }
}

/// Decoded `Error` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Session id, present only when the sender flagged it valid.
    pub imid: Option<u16>,
    /// Context id, present only when the sender flagged it valid.
    pub icid: Option<u16>,
    pub code: ErrorCode,
    pub detail_type: u16,
    pub detail: Vec<u8>,
}

impl ErrorReport {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            imid: None,
            icid: None,
            code,
            detail_type: 0,
            detail: Vec::new(),
        }
    }

    pub fn decode(payload: &[u8], endian: Endian) -> Result<Self> {
        let mut r = WireReader::new(payload, endian);
        let imid = r.get_u16()?;
        let icid = r.get_u16()?;
        let flag = r.get_u16()?;
        let code = r.get_u16()?;
        let detail_len = r.get_u16()? as usize;
        let detail_type = r.get_u16()?;
        let detail = r.get_bytes(detail_len.min(r.remaining()))?.to_vec();
        Ok(Self {
            imid: flags::has_flag(flag, flags::IMID_VALID).then_some(imid),
            icid: flags::has_flag(flag, flags::ICID_VALID).then_some(icid),
            code: ErrorCode::from_u16(code),
            detail_type,
            detail,
        })
    }

    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut flag = 0;
        if self.imid.is_some() {
            flag |= flags::IMID_VALID;
        }
        if self.icid.is_some() {
            flag |= flags::ICID_VALID;
        }
        // Detail past the 16-bit length field is cut.
        let detail = &self.detail[..self.detail.len().min(u16::MAX as usize)];
        let mut w = WireWriter::with_capacity(endian, 12 + detail.len());
        w.put_u16(self.imid.unwrap_or(0));
        w.put_u16(self.icid.unwrap_or(0));
        w.put_u16(flag);
        w.put_u16(self.code.as_u16());
        w.put_u16(detail.len() as u16);
        w.put_u16(self.detail_type);
        w.put_bytes(detail);
        w.pad_to_4();
        w.freeze().to_vec()
    }

    /// Whether this error is addressed to session `imid`.
    pub fn claims_session(&self, imid: u16) -> bool {
        self.imid == Some(imid)
    }

    /// Whether this error is addressed to context `icid` of session `imid`.
    pub fn claims_context(&self, imid: u16, icid: u16) -> bool {
        self.claims_session(imid) && self.icid == Some(icid)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code)?;
        if let Some(imid) = self.imid {
            write!(f, " imid={}", imid)?;
        }
        if let Some(icid) = self.icid {
            write!(f, " icid={}", icid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_respects_validity_flags() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_u16(7);
        w.put_u16(3);
        w.put_u16(flags::IMID_VALID);
        w.put_u16(13);
        w.put_u16(0);
        w.put_u16(0);
        let report = ErrorReport::decode(w.as_slice(), Endian::Little).unwrap();
        assert_eq!(report.imid, Some(7));
        assert_eq!(report.icid, None);
        assert_eq!(report.code, ErrorCode::BadProtocol);
        assert!(report.claims_session(7));
        assert!(!report.claims_context(7, 3));
    }

    #[test]
    fn test_encode_decode_with_detail() {
        let report = ErrorReport {
            imid: Some(1),
            icid: Some(2),
            code: ErrorCode::BadSomething,
            detail_type: 76,
            detail: b"xyz".to_vec(),
        };
        let bytes = report.encode(Endian::Big);
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(ErrorReport::decode(&bytes, Endian::Big).unwrap(), report);
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(ErrorCode::from_u16(16), ErrorCode::LocaleNotSupported);
        assert_eq!(ErrorCode::from_u16(999).as_u16(), 999);
        assert_eq!(ErrorCode::from_u16(42), ErrorCode::Other(42));
    }
}
