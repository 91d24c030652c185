//! Bounds-checked big-endian cursor over a byte source
//!
//! Every box parse runs inside a [`ByteRangeReader`] scoped to exactly
//! that box's payload. A reader can open nested subranges for child
//! boxes; a subrange can never read past its own end, no matter how many
//! bytes the underlying source still has.

use crate::error::{HeifError, Result};
use alloc::string::String;
use alloc::vec::Vec;
use whereat::At;

/// Outcome of asking a source whether `n` more bytes can become available.
///
/// The in-memory slice source answers immediately; `TimedOut` is reserved
/// for streaming sources where "not here yet" differs from "truncated".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowStatus {
    /// The requested bytes are available in the current range
    Enough,
    /// The source is known to end before the requested bytes
    WouldExceedEof,
    /// A streaming source gave up waiting (never produced by slices)
    TimedOut,
}

/// Bounds-checked big-endian reader over a borrowed byte range.
#[derive(Debug)]
pub struct ByteRangeReader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    range_start: usize,
}

impl<'a> ByteRangeReader<'a> {
    /// Reader over the whole source.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
            range_start: 0,
        }
    }

    /// Absolute position within the underlying source.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in the current range.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// True once the current range is fully consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    /// Non-consuming availability check for the current range.
    #[must_use]
    pub fn require_available(&self, n: u64) -> GrowStatus {
        if u64::try_from(self.remaining()).is_ok_and(|rem| rem >= n) {
            GrowStatus::Enough
        } else {
            GrowStatus::WouldExceedEof
        }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(At::from(HeifError::Truncated(what)));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8, "u64")?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a big-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read an unsigned integer whose byte width comes from a wire field.
    ///
    /// Only widths 0, 4 and 8 are wire-valid; anything else is a format
    /// error, not a supported encoding.
    pub fn read_sized(&mut self, width: u8) -> Result<u64> {
        match width {
            0 => Ok(0),
            4 => Ok(u64::from(self.read_u32()?)),
            8 => self.read_u64(),
            _ => Err(At::from(HeifError::InvalidData("bad sized-field width"))),
        }
    }

    /// Borrow `n` raw bytes from the range.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n, "raw bytes")
    }

    /// Copy all bytes remaining in the range.
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let rest = &self.data[self.pos..self.end];
        self.pos = self.end;
        rest.to_vec()
    }

    /// Read a four-character code.
    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4, "fourcc")?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Read a null-terminated UTF-8 string, consuming the terminator.
    ///
    /// A range that ends without a terminator yields the remaining bytes
    /// as the string, matching how real files truncate trailing names.
    pub fn read_null_string(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..self.end];
        let (raw, consumed) = match rest.iter().position(|&b| b == 0) {
            Some(nul) => (&rest[..nul], nul + 1),
            None => (rest, rest.len()),
        };
        let s = core::str::from_utf8(raw)
            .map_err(|_| At::from(HeifError::InvalidData("string is not UTF-8")))?;
        self.pos += consumed;
        Ok(String::from(s))
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n, "skip")?;
        Ok(())
    }

    /// Jump to the end of the current range.
    ///
    /// Called after every child-box parse so a partially consuming or
    /// failing parser never desyncs the parent cursor.
    pub fn skip_to_end(&mut self) {
        self.pos = self.end;
    }

    /// Open a nested range of exactly `length` bytes starting at the cursor.
    ///
    /// # Errors
    ///
    /// Fails with [`HeifError::InvalidBoxSize`] if `length` exceeds the
    /// bytes remaining in this range. The check and the construction are
    /// one atomic step; callers cannot build an oversized subrange.
    pub fn open_subrange(&self, length: u64) -> Result<ByteRangeReader<'a>> {
        let len = usize::try_from(length)
            .ok()
            .filter(|&l| l <= self.remaining())
            .ok_or(At::from(HeifError::InvalidBoxSize(
                "child range exceeds parent remaining",
            )))?;
        Ok(ByteRangeReader {
            data: self.data,
            pos: self.pos,
            end: self.pos + len,
            range_start: self.pos,
        })
    }

    /// Advance this reader past a subrange previously opened at the cursor.
    pub fn advance_over(&mut self, sub: &ByteRangeReader<'a>) {
        debug_assert_eq!(sub.range_start, self.pos);
        self.pos = sub.end;
    }

    /// Reader over an absolute window of the underlying source, used for
    /// out-of-band payload fetches (iloc extents, idat content).
    pub fn window(&self, offset: u64, length: u64) -> Result<ByteRangeReader<'a>> {
        let start = usize::try_from(offset)
            .map_err(|_| At::from(HeifError::Truncated("extent offset beyond source")))?;
        let len = usize::try_from(length)
            .map_err(|_| At::from(HeifError::Truncated("extent length beyond source")))?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or(At::from(HeifError::Truncated("extent beyond source end")))?;
        Ok(ByteRangeReader {
            data: self.data,
            pos: start,
            end,
            range_start: start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_reads_are_big_endian() {
        let mut r = ByteRangeReader::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_u32().unwrap(), 0x0304_0506);
        assert!(r.read_u8().is_err());
    }

    #[test]
    fn subrange_cannot_exceed_parent() {
        let r = ByteRangeReader::new(&[0; 8]);
        assert!(r.open_subrange(8).is_ok());
        assert!(r.open_subrange(9).is_err());
    }

    #[test]
    fn subrange_bounds_are_enforced() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let parent = ByteRangeReader::new(&data);
        let mut sub = parent.open_subrange(4).unwrap();
        assert_eq!(sub.read_u32().unwrap(), 0x0102_0304);
        // Source has more bytes, the subrange does not.
        assert!(sub.read_u8().is_err());
    }

    #[test]
    fn skip_to_end_resyncs_parent() {
        let data = [0u8; 10];
        let mut parent = ByteRangeReader::new(&data);
        let mut sub = parent.open_subrange(6).unwrap();
        let _ = sub.read_u16();
        sub.skip_to_end();
        parent.advance_over(&sub);
        assert_eq!(parent.remaining(), 4);
    }

    #[test]
    fn window_is_absolute_and_bounds_checked() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut r = ByteRangeReader::new(&data);
        // Cursor position must not affect the window placement.
        let _ = r.read_u16();
        let mut w = r.window(4, 2).unwrap();
        assert_eq!(w.read_u16().unwrap(), 0x0506);
        assert!(r.window(5, 2).is_err());
        assert!(r.window(u64::MAX, 1).is_err());
    }

    #[test]
    fn null_string() {
        let mut r = ByteRangeReader::new(b"abc\0def");
        assert_eq!(r.read_null_string().unwrap(), "abc");
        assert_eq!(r.read_null_string().unwrap(), "def");
    }

    #[test]
    fn sized_fields() {
        let mut r = ByteRangeReader::new(&[0, 0, 0, 7]);
        assert_eq!(r.read_sized(0).unwrap(), 0);
        assert_eq!(r.read_sized(4).unwrap(), 7);
        assert!(r.read_sized(3).is_err());
    }

    #[test]
    fn availability() {
        let r = ByteRangeReader::new(&[0; 4]);
        assert_eq!(r.require_available(4), GrowStatus::Enough);
        assert_eq!(r.require_available(5), GrowStatus::WouldExceedEof);
    }
}
