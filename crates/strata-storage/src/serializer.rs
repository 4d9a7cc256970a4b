//! Byte streams for the tile wire format.
//!
//! All integers are big-endian. [`SerializeOutput`] supports backpatching a
//! previously reserved `i32` so that length prefixes can be written before
//! the data they measure. [`SerializeInput`] checks every read against the
//! remaining bytes and reports truncation as `Corruption`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strata_common::constants::NULL_VARLEN_LENGTH;
use strata_common::{StrataError, StrataResult};

/// Growable output stream.
#[derive(Debug, Default)]
pub struct SerializeOutput {
    buf: BytesMut,
}

impl SerializeOutput {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stream with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Writes an `i8`.
    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    /// Writes an `i16`.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    /// Writes an `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Writes an `i64`.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Writes an `f64`.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    /// Writes raw bytes without a prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `[i32 len][bytes]`, or `-1` for `None`.
    pub fn write_varlen(&mut self, bytes: Option<&[u8]>) -> StrataResult<()> {
        match bytes {
            None => self.write_i32(NULL_VARLEN_LENGTH),
            Some(bytes) => {
                self.write_i32(length_prefix(bytes.len())?);
                self.write_bytes(bytes);
            }
        }
        Ok(())
    }

    /// Overwrites a previously written `i32` at `position`.
    pub fn write_i32_at(&mut self, position: usize, value: i32) -> StrataResult<()> {
        let end = position
            .checked_add(4)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                StrataError::internal(format!(
                    "backpatch at {} outside stream of {} bytes",
                    position,
                    self.buf.len()
                ))
            })?;
        self.buf[position..end].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Bytes written so far.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the stream.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Converts a byte length into an `i32` length prefix.
pub(crate) fn length_prefix(len: usize) -> StrataResult<i32> {
    i32::try_from(len).map_err(|_| {
        StrataError::invalid_argument(format!("{} bytes do not fit an i32 length prefix", len))
    })
}

/// Checked input stream over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct SerializeInput<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> SerializeInput<'a> {
    /// Wraps a buffer.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    /// Bytes not yet consumed.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Bytes consumed so far.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.total - self.buf.len()
    }

    fn ensure(&self, needed: usize, what: &str) -> StrataResult<()> {
        if self.buf.remaining() < needed {
            return Err(StrataError::corruption(format!(
                "stream truncated reading {} at offset {}: need {} bytes, {} left",
                what,
                self.position(),
                needed,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    /// Reads an `i8`.
    pub fn read_i8(&mut self) -> StrataResult<i8> {
        self.ensure(1, "i8")?;
        Ok(self.buf.get_i8())
    }

    /// Reads an `i16`.
    pub fn read_i16(&mut self) -> StrataResult<i16> {
        self.ensure(2, "i16")?;
        Ok(self.buf.get_i16())
    }

    /// Reads an `i32`.
    pub fn read_i32(&mut self) -> StrataResult<i32> {
        self.ensure(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    /// Reads an `i64`.
    pub fn read_i64(&mut self) -> StrataResult<i64> {
        self.ensure(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    /// Reads an `f64`.
    pub fn read_f64(&mut self) -> StrataResult<f64> {
        self.ensure(8, "f64")?;
        Ok(self.buf.get_f64())
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> StrataResult<&'a [u8]> {
        self.ensure(len, "bytes")?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads `[i32 len][bytes]`; `-1` yields `None`.
    pub fn read_varlen(&mut self) -> StrataResult<Option<&'a [u8]>> {
        let len = self.read_i32()?;
        if len == NULL_VARLEN_LENGTH {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| {
            StrataError::corruption(format!("negative length prefix {}", len))
        })?;
        self.read_bytes(len).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut out = SerializeOutput::new();
        out.write_i32(1);
        out.write_i16(-2);
        out.write_i8(-128);
        assert_eq!(out.data(), &[0, 0, 0, 1, 0xFF, 0xFE, 0x80]);
    }

    #[test]
    fn test_backpatch() {
        let mut out = SerializeOutput::new();
        let pos = out.position();
        out.write_i32(-1);
        out.write_bytes(b"abcdef");
        out.write_i32_at(pos, 6).unwrap();
        assert_eq!(&out.data()[..4], &6i32.to_be_bytes());

        assert!(out.write_i32_at(8, 0).is_err());
    }

    #[test]
    fn test_read_values() {
        let mut out = SerializeOutput::new();
        out.write_i64(-7);
        out.write_f64(2.5);
        out.write_varlen(Some(b"hey")).unwrap();
        out.write_varlen(None).unwrap();
        let bytes = out.freeze();

        let mut input = SerializeInput::new(&bytes);
        assert_eq!(input.read_i64().unwrap(), -7);
        assert_eq!(input.read_f64().unwrap(), 2.5);
        assert_eq!(input.read_varlen().unwrap(), Some(&b"hey"[..]));
        assert_eq!(input.read_varlen().unwrap(), None);
        assert_eq!(input.remaining(), 0);
        assert_eq!(input.position(), bytes.len());
    }

    #[test]
    fn test_truncation_is_corruption() {
        let mut input = SerializeInput::new(&[0, 0, 0]);
        assert!(input.read_i32().unwrap_err().is_corruption());

        // length says 10, only 2 bytes follow
        let mut input = SerializeInput::new(&[0, 0, 0, 10, 1, 2]);
        assert!(input.read_varlen().unwrap_err().is_corruption());

        let mut input = SerializeInput::new(&[0xFF, 0xFF, 0xFF, 0xFE]);
        assert!(input.read_varlen().unwrap_err().is_corruption());
    }
}
