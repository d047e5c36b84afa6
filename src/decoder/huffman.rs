//! Canonical Huffman decoding tables for VP8L prefix codes.

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodingError;
use super::bit_reader::BitReader;

const MAX_CODE_LENGTH: usize = 15;
const MAIN_TABLE_BITS: u8 = 8;
const MAIN_TABLE_SIZE: usize = 1 << MAIN_TABLE_BITS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HuffmanEntry {
    Empty,
    Leaf { symbol: u16, length: u8 },
    /// Codes longer than the main table continue in `subtables[subtable]`.
    Indirect { subtable: u16 },
}

#[derive(Clone, Debug)]
pub(crate) struct Subtable {
    bits: u8,
    entries: Vec<HuffmanEntry>,
}

/// A decoding table for one prefix code.
///
/// Codes are looked up by their first 8 bits in the main table. Longer
/// codes go through one second-level table per 8-bit prefix, sized to the
/// longest code sharing that prefix.
#[derive(Clone, Debug)]
pub(crate) enum HuffmanTree {
    /// Only one symbol is used; decoding it consumes no bits.
    Single(u16),
    Table {
        main: Vec<HuffmanEntry>,
        subtables: Vec<Subtable>,
    },
}

impl HuffmanTree {
    /// Builds the table from per-symbol code lengths (0 = unused).
    ///
    /// Fails unless the lengths describe a complete prefix code or exactly
    /// one symbol is used.
    pub(crate) fn build(code_lengths: &[u8]) -> Result<Self, DecodingError> {
        let mut histogram = [0u16; MAX_CODE_LENGTH + 1];
        let mut last_used = None;
        for (symbol, &length) in code_lengths.iter().enumerate() {
            if usize::from(length) > MAX_CODE_LENGTH {
                return Err(DecodingError::HuffmanError);
            }
            if length > 0 {
                histogram[usize::from(length)] += 1;
                last_used = Some(symbol);
            }
        }

        let used: u16 = histogram[1..].iter().sum();
        match (used, last_used) {
            (0, _) | (_, None) => return Err(DecodingError::HuffmanError),
            (1, Some(symbol)) => return Ok(Self::Single(symbol as u16)),
            _ => {}
        }

        // Kraft sum must be exactly one.
        let mut left: i32 = 1;
        for &count in &histogram[1..] {
            left = (left << 1) - i32::from(count);
            if left < 0 {
                return Err(DecodingError::HuffmanError);
            }
        }
        if left != 0 {
            return Err(DecodingError::HuffmanError);
        }

        let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
        let mut code = 0u16;
        for length in 1..=MAX_CODE_LENGTH {
            code = (code + histogram[length - 1]) << 1;
            next_code[length] = code;
        }

        // (symbol, bit-reversed code, length)
        let mut codes = Vec::with_capacity(usize::from(used));
        for (symbol, &length) in code_lengths.iter().enumerate() {
            if length == 0 {
                continue;
            }
            let code = next_code[usize::from(length)];
            next_code[usize::from(length)] += 1;
            codes.push((symbol as u16, reverse_bits(code, length), length));
        }

        let mut subtable_bits = [0u8; MAIN_TABLE_SIZE];
        for &(_, code, length) in &codes {
            if length > MAIN_TABLE_BITS {
                let prefix = usize::from(code) & (MAIN_TABLE_SIZE - 1);
                subtable_bits[prefix] = subtable_bits[prefix].max(length - MAIN_TABLE_BITS);
            }
        }

        let mut main = vec![HuffmanEntry::Empty; MAIN_TABLE_SIZE];
        let mut subtables = Vec::new();
        for (prefix, &bits) in subtable_bits.iter().enumerate() {
            if bits > 0 {
                main[prefix] = HuffmanEntry::Indirect {
                    subtable: subtables.len() as u16,
                };
                subtables.push(Subtable {
                    bits,
                    entries: vec![HuffmanEntry::Empty; 1 << bits],
                });
            }
        }

        for (symbol, code, length) in codes {
            let leaf = HuffmanEntry::Leaf { symbol, length };
            if length <= MAIN_TABLE_BITS {
                for slot in main[usize::from(code)..].iter_mut().step_by(1 << length) {
                    *slot = leaf;
                }
            } else {
                let prefix = usize::from(code) & (MAIN_TABLE_SIZE - 1);
                let HuffmanEntry::Indirect { subtable } = main[prefix] else {
                    return Err(DecodingError::HuffmanError);
                };
                let subtable = &mut subtables[usize::from(subtable)];
                let start = usize::from(code >> MAIN_TABLE_BITS);
                let step = 1 << (length - MAIN_TABLE_BITS);
                for slot in subtable.entries[start..].iter_mut().step_by(step) {
                    *slot = leaf;
                }
            }
        }

        Ok(Self::Table { main, subtables })
    }

    /// Decodes one symbol, consuming exactly its code length.
    #[inline]
    pub(crate) fn read_symbol(&self, reader: &mut BitReader<'_>) -> Result<u16, DecodingError> {
        let (main, subtables) = match self {
            Self::Single(symbol) => return Ok(*symbol),
            Self::Table { main, subtables } => (main, subtables),
        };

        let bits = reader.peek_bits(MAX_CODE_LENGTH as u8) as usize;
        let entry = match main[bits & (MAIN_TABLE_SIZE - 1)] {
            HuffmanEntry::Indirect { subtable } => {
                let subtable = &subtables[usize::from(subtable)];
                let index = (bits >> MAIN_TABLE_BITS) & ((1 << subtable.bits) - 1);
                subtable.entries[index]
            }
            entry => entry,
        };

        match entry {
            HuffmanEntry::Leaf { symbol, length } => {
                reader.consume(length)?;
                Ok(symbol)
            }
            HuffmanEntry::Empty | HuffmanEntry::Indirect { .. } => Err(DecodingError::HuffmanError),
        }
    }
}

fn reverse_bits(code: u16, length: u8) -> u16 {
    code.reverse_bits() >> (16 - u32::from(length))
}
