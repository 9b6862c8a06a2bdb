//! Endian-aware payload writer and reader.
//!
//! Every payload field in a session uses the byte order fixed at connect
//! time, so both types carry an [`Endian`] and expose plain `put_*` /
//! `get_*` calls; callers never swap bytes themselves.
//!
//! # Example
//!
//! ```
//! use xim_client::codec::{WireReader, WireWriter};
//! use xim_client::protocol::Endian;
//!
//! let mut w = WireWriter::new(Endian::Little);
//! w.put_u16(7);
//! w.put_string8_u16(b"abc").unwrap();
//! w.pad_to_4();
//!
//! let bytes = w.freeze();
//! let mut r = WireReader::new(&bytes, Endian::Little);
//! assert_eq!(r.get_u16().unwrap(), 7);
//! assert_eq!(r.get_string8_u16().unwrap(), b"abc");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, XimError};
use crate::protocol::{pad, Endian};

/// Growable payload buffer.
#[derive(Debug, Clone)]
pub struct WireWriter {
    buf: BytesMut,
    endian: Endian,
}

impl WireWriter {
    pub fn new(endian: Endian) -> Self {
        Self::with_capacity(endian, 64)
    }

    pub fn with_capacity(endian: Endian, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            endian,
        }
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        match self.endian {
            Endian::Little => self.buf.put_u16_le(v),
            Endian::Big => self.buf.put_u16(v),
        }
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_u16(v as u16);
    }

    pub fn put_u32(&mut self, v: u32) {
        match self.endian {
            Endian::Little => self.buf.put_u32_le(v),
            Endian::Big => self.buf.put_u32(v),
        }
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn put_zeros(&mut self, n: usize) {
        self.buf.put_bytes(0, n);
    }

    /// `u16` length, bytes, then padding over `2 + len`.
    pub fn put_string8_u16(&mut self, data: &[u8]) -> Result<()> {
        self.put_len_u16(data.len())?;
        self.put_bytes(data);
        self.put_zeros(pad(2 + data.len()));
        Ok(())
    }

    /// Count or length field of one byte.
    pub fn put_len_u8(&mut self, len: usize) -> Result<()> {
        let v = u8::try_from(len).map_err(|_| XimError::PayloadTooLarge(len))?;
        self.put_u8(v);
        Ok(())
    }

    /// Count or length field of two bytes.
    pub fn put_len_u16(&mut self, len: usize) -> Result<()> {
        let v = u16::try_from(len).map_err(|_| XimError::PayloadTooLarge(len))?;
        self.put_u16(v);
        Ok(())
    }

    /// Zero-fill up to the next 4-byte boundary of the payload.
    pub fn pad_to_4(&mut self) {
        self.put_zeros(pad(self.buf.len()));
    }

    /// Write a placeholder `u16` and return its offset for [`patch_u16`](Self::patch_u16).
    pub fn reserve_u16(&mut self) -> usize {
        let at = self.buf.len();
        self.put_u16(0);
        at
    }

    /// Overwrite a `u16` previously reserved at `at`.
    pub fn patch_u16(&mut self, at: usize, v: u16) {
        let bytes = self.endian.u16_bytes(v);
        self.buf[at..at + 2].copy_from_slice(&bytes);
    }

    /// Drop everything written after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Finish writing and hand the payload off.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a received payload.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(XimError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.get_bytes(2)?;
        Ok(self.endian.read_u16([b[0], b[1]]))
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.get_bytes(4)?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        })
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.get_bytes(n).map(|_| ())
    }

    /// Skip the padding that follows `n` bytes of content.
    ///
    /// Trailing padding may be cut short at the very end of a payload.
    pub fn skip_pad(&mut self, n: usize) -> Result<()> {
        let p = pad(n).min(self.remaining());
        self.skip(p)
    }

    /// Skip to the next 4-byte boundary of the payload.
    pub fn align_to_4(&mut self) -> Result<()> {
        self.skip_pad(self.pos)
    }

    /// Inverse of [`WireWriter::put_string8_u16`].
    pub fn get_string8_u16(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u16()? as usize;
        let data = self.get_bytes(len)?;
        self.skip_pad(2 + len)?;
        Ok(data)
    }

    /// Split off the next `n` bytes as an independent reader.
    pub fn sub_reader(&mut self, n: usize) -> Result<WireReader<'a>> {
        let bytes = self.get_bytes(n)?;
        Ok(WireReader::new(bytes, self.endian))
    }

    /// Everything not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_endianness() {
        let mut w = WireWriter::new(Endian::Big);
        w.put_u16(0x0102);
        w.put_u32(0x03040506);
        assert_eq!(w.as_slice(), &[1, 2, 3, 4, 5, 6]);

        let mut w = WireWriter::new(Endian::Little);
        w.put_u16(0x0102);
        w.put_u32(0x03040506);
        assert_eq!(w.as_slice(), &[2, 1, 6, 5, 4, 3]);
    }

    #[test]
    fn test_pad_to_4_zero_fills() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_u8(0xff);
        w.pad_to_4();
        assert_eq!(w.as_slice(), &[0xff, 0, 0, 0]);
        w.pad_to_4();
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut w = WireWriter::new(Endian::Big);
        let at = w.reserve_u16();
        w.put_bytes(b"xyz");
        w.patch_u16(at, 3);
        assert_eq!(w.as_slice(), &[0, 3, b'x', b'y', b'z']);
    }

    #[test]
    fn test_reader_truncated() {
        let mut r = WireReader::new(&[1, 2, 3], Endian::Little);
        assert_eq!(r.get_u16().unwrap(), 0x0201);
        assert!(matches!(r.get_u16(), Err(XimError::Truncated)));
    }

    #[test]
    fn test_string8_roundtrip_with_padding() {
        let mut w = WireWriter::new(Endian::Little);
        w.put_string8_u16(b"hello").unwrap();
        assert_eq!(w.len(), 8);
        let bytes = w.freeze();
        let mut r = WireReader::new(&bytes, Endian::Little);
        assert_eq!(r.get_string8_u16().unwrap(), b"hello");
        assert!(r.is_empty());
    }

    #[test]
    fn test_oversize_lengths_are_rejected() {
        let mut w = WireWriter::new(Endian::Little);
        assert!(matches!(w.put_len_u8(256), Err(XimError::PayloadTooLarge(256))));
        assert!(w.put_len_u16(70_000).is_err());
        assert!(w.put_string8_u16(&vec![0u8; 70_000]).is_err());
        assert!(w.is_empty());

        w.put_len_u8(255).unwrap();
        w.put_len_u16(65_535).unwrap();
        assert_eq!(w.as_slice(), &[255, 255, 255]);
    }

    #[test]
    fn test_sub_reader_is_bounded() {
        let data = [1u8, 0, 2, 0, 3, 0];
        let mut r = WireReader::new(&data, Endian::Little);
        let mut sub = r.sub_reader(4).unwrap();
        assert_eq!(sub.get_u16().unwrap(), 1);
        assert_eq!(sub.get_u16().unwrap(), 2);
        assert!(sub.get_u16().is_err());
        assert_eq!(r.get_u16().unwrap(), 3);
    }
}
