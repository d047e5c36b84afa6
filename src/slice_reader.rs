//! Cursor over a borrowed byte slice, used to walk RIFF chunks and
//! fixed-layout headers without the standard library.

use byteorder_lite::{ByteOrder, LittleEndian};
use core::fmt;

use crate::decoder::DecodingError;

/// A reader that wraps a byte slice and tracks the current position.
///
/// Every read that would run past the end fails with
/// [`DecodingError::BitStreamError`] and leaves the position unchanged.
#[derive(Clone)]
pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Moves to an absolute offset. Seeking to the very end is allowed.
    pub(crate) fn seek_from_start(&mut self, pos: usize) -> Result<(), DecodingError> {
        if pos > self.data.len() {
            return Err(DecodingError::BitStreamError);
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), DecodingError> {
        self.take_slice(n).map(|_| ())
    }

    /// Borrows the next `n` bytes and advances past them.
    pub(crate) fn take_slice(&mut self, n: usize) -> Result<&'a [u8], DecodingError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodingError::BitStreamError)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodingError> {
        let src = self.take_slice(buf.len())?;
        buf.copy_from_slice(src);
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodingError> {
        Ok(self.take_slice(1)?[0])
    }

    pub(crate) fn read_u16_le(&mut self) -> Result<u16, DecodingError> {
        Ok(LittleEndian::read_u16(self.take_slice(2)?))
    }

    pub(crate) fn read_u24_le(&mut self) -> Result<u32, DecodingError> {
        Ok(LittleEndian::read_u24(self.take_slice(3)?))
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32, DecodingError> {
        Ok(LittleEndian::read_u32(self.take_slice(4)?))
    }
}

impl fmt::Debug for SliceReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceReader")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_values() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a];
        let mut r = SliceReader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16_le().unwrap(), 0x0302);
        assert_eq!(r.read_u24_le().unwrap(), 0x06_0504);
        assert_eq!(r.read_u32_le().unwrap(), 0x0a09_0807);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_leaves_position() {
        let data = [1u8, 2, 3];
        let mut r = SliceReader::new(&data);
        r.skip(1).unwrap();
        assert!(matches!(r.read_u32_le(), Err(DecodingError::BitStreamError)));
        assert_eq!(r.position(), 1);
        assert_eq!(r.take_slice(2).unwrap(), &[2, 3]);
    }

    #[test]
    fn seek_bounds() {
        let data = [0u8; 4];
        let mut r = SliceReader::new(&data);
        assert!(r.seek_from_start(4).is_ok());
        assert!(r.seek_from_start(5).is_err());
        assert!(r.take_slice(usize::MAX).is_err());
    }
}
