//! Boolean entropy decoder for VP8 (RFC 6386 section 7).
//!
//! The decoder keeps `range - 1` (always in `127..=254` after
//! normalization) and a window of up to 56 look-ahead bits, loading seven
//! bytes at a time while at least that many remain. Running out of input is
//! not an immediate error: the first missing byte is read as zero and the
//! `eof` flag is raised, which callers inspect through [`ArithmeticDecoder::check`]
//! once per header or macroblock.

use super::api::DecodingError;
use crate::common::types::Prob;

/// Number of bits loaded at once.
const BITS: i32 = 56;
const BYTES_PER_LOAD: usize = (BITS / 8) as usize;

pub(crate) struct ArithmeticDecoder<'a> {
    buf: &'a [u8],
    value: u64,
    /// Current range minus 1.
    range: u32,
    /// Number of unread bits in `value` beyond the 8 being decoded.
    bits: i32,
    eof: bool,
}

impl<'a> ArithmeticDecoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            buf: data,
            value: 0,
            range: 255 - 1,
            bits: -8,
            eof: false,
        };
        decoder.load_new_bytes();
        decoder
    }

    #[cold]
    fn load_final_bytes(&mut self) {
        if let Some((&byte, rest)) = self.buf.split_first() {
            self.bits += 8;
            self.value = u64::from(byte) | (self.value << 8);
            self.buf = rest;
        } else if !self.eof {
            self.value <<= 8;
            self.bits += 8;
            self.eof = true;
        } else {
            self.bits = 0;
        }
    }

    #[inline(always)]
    fn load_new_bytes(&mut self) {
        if self.buf.len() >= BYTES_PER_LOAD {
            let (head, rest) = self.buf.split_at(BYTES_PER_LOAD);
            let in_bits = head
                .iter()
                .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
            self.value = in_bits | (self.value << BITS);
            self.bits += BITS;
            self.buf = rest;
        } else {
            self.load_final_bytes();
        }
    }

    /// Decodes one boolean whose probability of being `false` is `prob / 256`.
    #[inline(always)]
    pub(crate) fn read_bool(&mut self, prob: Prob) -> bool {
        if self.bits < 0 {
            self.load_new_bytes();
        }

        let mut range = self.range;
        let pos = self.bits;
        let split = (range * u32::from(prob)) >> 8;
        let value = (self.value >> pos) as u32;
        let bit = value > split;

        if bit {
            range -= split;
            self.value -= (u64::from(split) + 1) << pos;
        } else {
            range = split + 1;
        }

        // Renormalize so that the top bit of `range` lands on bit 7.
        let shift = 7 ^ (31 ^ range.leading_zeros() as i32);
        range <<= shift;
        self.bits -= shift;
        self.range = range - 1;

        bit
    }

    #[inline(always)]
    pub(crate) fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// Reads an `n`-bit unsigned value, most significant bit first.
    pub(crate) fn read_literal(&mut self, n: u8) -> u8 {
        (0..n).fold(0u8, |v, _| (v << 1) | u8::from(self.read_flag()))
    }

    /// Reads an `n`-bit magnitude followed by a sign flag.
    pub(crate) fn read_signed_value(&mut self, n: u8) -> i32 {
        let magnitude = i32::from(self.read_literal(n));
        if self.read_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Reads a presence flag and, if set, a signed value; otherwise 0.
    pub(crate) fn read_optional_signed_value(&mut self, n: u8) -> i32 {
        if self.read_flag() {
            self.read_signed_value(n)
        } else {
            0
        }
    }

    /// Walks an RFC 6386 style tree: positive entries index the next node
    /// pair, entries `<= 0` are negated leaf values. `probs[i >> 1]` is the
    /// probability for the node pair starting at `i`.
    pub(crate) fn read_tree(&mut self, tree: &[i8], probs: &[Prob]) -> i8 {
        let mut index = 0usize;
        loop {
            let next = tree[index + usize::from(self.read_bool(probs[index >> 1]))];
            if next <= 0 {
                return -next;
            }
            index = next as usize;
        }
    }

    /// Passes `value` through unless the input ran out.
    pub(crate) fn check<T>(&self, value: T) -> Result<T, DecodingError> {
        if self.eof {
            Err(DecodingError::BitStreamError)
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec::Vec;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// The boolean encoder from RFC 6386 section 7.3.
    pub(crate) struct BoolEncoder {
        out: Vec<u8>,
        range: u32,
        bottom: u32,
        bit_count: i32,
    }

    impl BoolEncoder {
        pub(crate) fn new() -> Self {
            Self {
                out: Vec::new(),
                range: 255,
                bottom: 0,
                bit_count: 24,
            }
        }

        fn add_one_to_output(&mut self) {
            for byte in self.out.iter_mut().rev() {
                if *byte == 255 {
                    *byte = 0;
                } else {
                    *byte += 1;
                    break;
                }
            }
        }

        pub(crate) fn write_bool(&mut self, prob: Prob, bit: bool) {
            let split = 1 + (((self.range - 1) * u32::from(prob)) >> 8);
            if bit {
                self.bottom = self.bottom.wrapping_add(split);
                self.range -= split;
            } else {
                self.range = split;
            }
            while self.range < 128 {
                self.range <<= 1;
                if self.bottom & (1 << 31) != 0 {
                    self.add_one_to_output();
                }
                self.bottom <<= 1;
                self.bit_count -= 1;
                if self.bit_count == 0 {
                    self.out.push((self.bottom >> 24) as u8);
                    self.bottom &= (1 << 24) - 1;
                    self.bit_count = 8;
                }
            }
        }

        pub(crate) fn write_literal(&mut self, n: u8, value: u32) {
            for i in (0..n).rev() {
                self.write_bool(128, (value >> i) & 1 != 0);
            }
        }

        pub(crate) fn finish(mut self) -> Vec<u8> {
            let mut c = self.bit_count;
            let mut v = self.bottom;
            if v & (1 << (32 - c)) != 0 {
                self.add_one_to_output();
            }
            v <<= c & 7;
            c >>= 3;
            while c > 0 {
                c -= 1;
                v <<= 8;
            }
            for _ in 0..4 {
                self.out.push((v >> 24) as u8);
                v <<= 8;
            }
            self.out
        }
    }

    #[test]
    fn random_booleans_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let symbols: Vec<(u8, bool)> = (0..5000)
            .map(|_| {
                let prob: u8 = rng.gen_range(1..=255);
                (prob, rng.gen_range(0..256u32) >= u32::from(prob))
            })
            .collect();

        let mut enc = BoolEncoder::new();
        for &(prob, bit) in &symbols {
            enc.write_bool(prob, bit);
        }
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        for (i, &(prob, bit)) in symbols.iter().enumerate() {
            assert_eq!(dec.read_bool(prob), bit, "symbol {i}");
        }
        assert!(dec.check(()).is_ok());
    }

    #[test]
    fn literals_and_signed_values() {
        let mut enc = BoolEncoder::new();
        enc.write_literal(7, 101);
        // optional signed: present, magnitude 5, negative
        enc.write_bool(128, true);
        enc.write_literal(4, 5);
        enc.write_bool(128, true);
        // optional signed: absent
        enc.write_bool(128, false);
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        assert_eq!(dec.read_literal(7), 101);
        assert_eq!(dec.read_optional_signed_value(4), -5);
        assert_eq!(dec.read_optional_signed_value(4), 0);
        assert!(!dec.eof);
    }

    #[test]
    fn tree_walk() {
        // Two-level tree: leaves 0, 1, 2.
        const TREE: [i8; 4] = [-0, 2, -1, -2];
        let probs = [100, 200];
        let mut enc = BoolEncoder::new();
        for leaf in [2u8, 0, 1, 1, 2] {
            match leaf {
                0 => enc.write_bool(probs[0], false),
                1 => {
                    enc.write_bool(probs[0], true);
                    enc.write_bool(probs[1], false);
                }
                _ => {
                    enc.write_bool(probs[0], true);
                    enc.write_bool(probs[1], true);
                }
            }
        }
        let data = enc.finish();
        let mut dec = ArithmeticDecoder::new(&data);
        let leaves: Vec<i8> = (0..5).map(|_| dec.read_tree(&TREE, &probs)).collect();
        assert_eq!(leaves, [2, 0, 1, 1, 2]);
    }

    #[test]
    fn same_input_same_state() {
        let data = [0x9d, 0x01, 0x2a, 0x47, 0x11, 0xfe, 0x00, 0x80, 0x33];
        let run = || {
            let mut dec = ArithmeticDecoder::new(&data);
            let bits: Vec<bool> = (0..40).map(|i| dec.read_bool((i * 37 % 255 + 1) as u8)).collect();
            (bits, dec.range, dec.value, dec.bits, dec.eof)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn exhaustion_sets_eof() {
        let mut dec = ArithmeticDecoder::new(&[0xff]);
        for _ in 0..64 {
            dec.read_flag();
        }
        assert!(dec.eof);
        assert!(matches!(dec.check(()), Err(DecodingError::BitStreamError)));
    }
}
