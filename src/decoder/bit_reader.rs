//! LSB-first bit reader for the VP8L bitstream.

use byteorder_lite::{ByteOrder, LittleEndian};

use super::api::DecodingError;

/// Reads bits least-significant first out of a byte slice.
///
/// Up to 64 bits are buffered in `buffer`; the `nbits` live bits sit at the
/// bottom. Refilling is lazy and never fails: only consuming more bits than
/// the input holds is an error.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    nbits: u8,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            nbits: 0,
        }
    }

    /// Tops the buffer up to at least 56 live bits, or as many as remain.
    pub(crate) fn fill(&mut self) {
        debug_assert!(self.nbits < 64);

        if let Some(chunk) = self.data.get(self.pos..self.pos + 8) {
            // Bytes that do not fit wholly are loaded again on the next fill.
            self.buffer |= LittleEndian::read_u64(chunk) << self.nbits;
            let taken = (63 - self.nbits) / 8;
            self.pos += usize::from(taken);
            self.nbits += taken * 8;
        } else {
            while self.nbits <= 56 {
                let Some(&byte) = self.data.get(self.pos) else {
                    break;
                };
                self.buffer |= u64::from(byte) << self.nbits;
                self.pos += 1;
                self.nbits += 8;
            }
        }
    }

    /// Returns the next `n` bits without consuming them. Bits past the end
    /// of the input read as zero.
    pub(crate) fn peek_bits(&mut self, n: u8) -> u64 {
        debug_assert!(n <= 56);
        if self.nbits < n {
            self.fill();
        }
        self.buffer & ((1u64 << n) - 1)
    }

    pub(crate) fn consume(&mut self, n: u8) -> Result<(), DecodingError> {
        if self.nbits < n {
            self.fill();
            if self.nbits < n {
                return Err(DecodingError::BitStreamError);
            }
        }
        self.buffer >>= n;
        self.nbits -= n;
        Ok(())
    }

    /// Reads an `n`-bit unsigned value, `n <= 32`.
    pub(crate) fn read_bits(&mut self, n: u8) -> Result<u32, DecodingError> {
        debug_assert!(n <= 32);
        let value = self.peek_bits(n) as u32;
        self.consume(n)?;
        Ok(value)
    }

    pub(crate) fn read_bit(&mut self) -> Result<bool, DecodingError> {
        Ok(self.read_bits(1)? == 1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Packs values least-significant bit first, the inverse of [`BitReader`].
    #[derive(Default)]
    pub(crate) struct BitWriter {
        bytes: Vec<u8>,
        acc: u64,
        nbits: u8,
    }

    impl BitWriter {
        pub(crate) fn write(&mut self, value: u32, n: u8) {
            debug_assert!(n <= 32);
            self.acc |= (u64::from(value) & ((1u64 << n) - 1)) << self.nbits;
            self.nbits += n;
            while self.nbits >= 8 {
                self.bytes.push(self.acc as u8);
                self.acc >>= 8;
                self.nbits -= 8;
            }
        }

        pub(crate) fn finish(mut self) -> Vec<u8> {
            if self.nbits > 0 {
                self.bytes.push(self.acc as u8);
            }
            self.bytes
        }
    }

    #[test]
    fn reads_lsb_first() {
        let data = [0b1010_0110, 0xff, 0x01];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(1).unwrap(), 0);
        assert_eq!(r.read_bits(2).unwrap(), 0b11);
        assert_eq!(r.read_bits(5).unwrap(), 0b10100);
        assert_eq!(r.read_bits(9).unwrap(), 0x1ff);
        assert_eq!(r.read_bits(7).unwrap(), 0);
        assert!(r.read_bit().is_err());
    }

    #[test]
    fn long_stream_across_refills() {
        let mut w = BitWriter::default();
        let values: Vec<(u32, u8)> = (0..500u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 3, (i % 32 + 1) as u8))
            .collect();
        for &(v, n) in &values {
            w.write(v, n);
        }
        let data = w.finish();

        let mut r = BitReader::new(&data);
        for &(v, n) in &values {
            let mask = if n == 32 { u32::MAX } else { (1 << n) - 1 };
            assert_eq!(r.read_bits(n).unwrap(), v & mask);
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let data = [0x5a, 0x3c];
        let mut r = BitReader::new(&data);
        assert_eq!(r.peek_bits(8), 0x5a);
        assert_eq!(r.peek_bits(15), 0x3c5a);
        r.consume(4).unwrap();
        assert_eq!(r.read_bits(8).unwrap(), 0xc5);
        // Four bits remain; consuming five fails.
        assert!(r.consume(5).is_err());
        assert_eq!(r.read_bits(4).unwrap(), 0x3);
    }

    #[test]
    fn zero_bit_read_at_end() {
        let mut r = BitReader::new(&[]);
        assert_eq!(r.read_bits(0).unwrap(), 0);
        assert!(r.read_bits(1).is_err());
    }
}
