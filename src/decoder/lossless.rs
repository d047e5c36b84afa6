//! Decoding of lossless WebP images (VP8L).
//!
//! A VP8L stream is a header, a list of transforms, and an entropy-coded
//! ARGB image. Entropy-coded images also appear nested: transform side data,
//! the palette and the meta prefix-code image are all coded the same way,
//! minus the color cache and meta codes.

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodingError;
use super::bit_reader::BitReader;
use super::huffman::HuffmanTree;
use super::lossless_transform::{add_pixels, subsample_size, Transform};

const CODE_LENGTH_CODES: usize = 19;
const CODE_LENGTH_CODE_ORDER: [usize; CODE_LENGTH_CODES] = [
    17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Repeat codes 16, 17 and 18: extra bits and base repeat count.
const CODE_LENGTH_REPEAT_EXTRA_BITS: [u8; 3] = [2, 3, 7];
const CODE_LENGTH_REPEAT_OFFSETS: [usize; 3] = [3, 3, 11];
const DEFAULT_CODE_LENGTH: u8 = 8;

const NUM_LITERAL_CODES: u16 = 256;
const NUM_LENGTH_CODES: u16 = 24;
const NUM_DISTANCE_CODES: u16 = 40;
const MAX_COLOR_CACHE_BITS: u8 = 11;

const GREEN: usize = 0;
const RED: usize = 1;
const BLUE: usize = 2;
const ALPHA: usize = 3;
const DIST: usize = 4;

const HUFFMAN_CODES_PER_META_CODE: usize = 5;

/// (dx, dy) for the 120 short distance codes, nearest neighbours first.
#[rustfmt::skip]
const DISTANCE_MAP: [(i8, u8); 120] = [
    (0, 1),  (1, 0),  (1, 1),  (-1, 1), (0, 2),  (2, 0),  (1, 2),
    (-1, 2), (2, 1),  (-2, 1), (2, 2),  (-2, 2), (0, 3),  (3, 0),
    (1, 3),  (-1, 3), (3, 1),  (-3, 1), (2, 3),  (-2, 3), (3, 2),
    (-3, 2), (0, 4),  (4, 0),  (1, 4),  (-1, 4), (4, 1),  (-4, 1),
    (3, 3),  (-3, 3), (2, 4),  (-2, 4), (4, 2),  (-4, 2), (0, 5),
    (3, 4),  (-3, 4), (4, 3),  (-4, 3), (5, 0),  (1, 5),  (-1, 5),
    (5, 1),  (-5, 1), (2, 5),  (-2, 5), (5, 2),  (-5, 2), (4, 4),
    (-4, 4), (3, 5),  (-3, 5), (5, 3),  (-5, 3), (0, 6),  (6, 0),
    (1, 6),  (-1, 6), (6, 1),  (-6, 1), (2, 6),  (-2, 6), (6, 2),
    (-6, 2), (4, 5),  (-4, 5), (5, 4),  (-5, 4), (3, 6),  (-3, 6),
    (6, 3),  (-6, 3), (0, 7),  (7, 0),  (1, 7),  (-1, 7), (5, 5),
    (-5, 5), (7, 1),  (-7, 1), (4, 6),  (-4, 6), (6, 4),  (-6, 4),
    (2, 7),  (-2, 7), (7, 2),  (-7, 2), (3, 7),  (-3, 7), (7, 3),
    (-7, 3), (5, 6),  (-5, 6), (6, 5),  (-6, 5), (8, 0),  (4, 7),
    (-4, 7), (7, 4),  (-7, 4), (8, 1),  (8, 2),  (6, 6),  (-6, 6),
    (8, 3),  (5, 7),  (-5, 7), (7, 5),  (-7, 5), (8, 4),  (6, 7),
    (-6, 7), (7, 6),  (-7, 6), (8, 5),  (7, 7),  (-7, 7), (8, 6),
    (8, 7),
];

type HuffmanCodeGroup = [HuffmanTree; HUFFMAN_CODES_PER_META_CODE];

/// Small hash table of recently seen colors.
#[derive(Debug, Clone)]
struct ColorCache {
    bits: u8,
    colors: Vec<u32>,
}

impl ColorCache {
    fn new(bits: u8) -> Self {
        Self {
            bits,
            colors: vec![0; 1 << bits],
        }
    }

    #[inline]
    fn insert(&mut self, argb: u32) {
        let key = 0x1e35_a7bd_u32.wrapping_mul(argb) >> (32 - u32::from(self.bits));
        self.colors[key as usize] = argb;
    }

    #[inline]
    fn lookup(&self, key: usize) -> Option<u32> {
        self.colors.get(key).copied()
    }

    fn len(&self) -> u16 {
        1 << self.bits
    }
}

/// Prefix codes for one entropy-coded image.
struct HuffmanInfo {
    /// Width of the meta image in blocks; 0 without meta codes.
    xsize: u16,
    bits: u8,
    /// Column mask at which the code group may change.
    mask: u16,
    /// Meta code index for each block.
    image: Vec<u32>,
    groups: Vec<HuffmanCodeGroup>,
}

impl HuffmanInfo {
    #[inline]
    fn group_index(&self, x: u16, y: u16) -> usize {
        if self.bits == 0 {
            return 0;
        }
        let block =
            usize::from(y >> self.bits) * usize::from(self.xsize) + usize::from(x >> self.bits);
        self.image.get(block).copied().unwrap_or(0) as usize
    }
}

/// Header fields of a VP8L bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LosslessHeader {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) alpha_is_used: bool,
}

impl LosslessHeader {
    pub(crate) const SIGNATURE: u8 = 0x2f;

    /// Parses the signature byte and the 32-bit size/flags word.
    pub(crate) fn read(bit_reader: &mut BitReader<'_>) -> Result<Self, DecodingError> {
        let signature = bit_reader.read_bits(8)? as u8;
        if signature != Self::SIGNATURE {
            return Err(DecodingError::LosslessSignatureInvalid(signature));
        }

        let width = bit_reader.read_bits(14)? as u16 + 1;
        let height = bit_reader.read_bits(14)? as u16 + 1;
        let alpha_is_used = bit_reader.read_bit()?;
        let version = bit_reader.read_bits(3)? as u8;
        if version != 0 {
            return Err(DecodingError::VersionNumberInvalid(version));
        }

        Ok(Self {
            width,
            height,
            alpha_is_used,
        })
    }
}

/// Lossless (VP8L) image decoder.
pub(crate) struct LosslessDecoder<'a> {
    bit_reader: BitReader<'a>,
    /// Transforms in declaration order, with the width current before each.
    transforms: Vec<(Transform, u16)>,
    width: u16,
    height: u16,
}

impl<'a> LosslessDecoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            bit_reader: BitReader::new(data),
            transforms: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    /// Decodes the frame into `buf` as RGBA.
    ///
    /// With `implicit_dimensions` the stream has no header and is taken to be
    /// `width` x `height`, as in the ALPH chunk. Otherwise the header must
    /// agree with the given size.
    pub(crate) fn decode_frame(
        &mut self,
        width: u32,
        height: u32,
        implicit_dimensions: bool,
        buf: &mut [u8],
    ) -> Result<(), DecodingError> {
        let argb = self.decode_argb(width, height, implicit_dimensions)?;
        if buf.len() < argb.len() * 4 {
            return Err(DecodingError::ImageTooLarge);
        }
        for (&pixel, rgba) in argb.iter().zip(buf.chunks_exact_mut(4)) {
            let [a, r, g, b] = pixel.to_be_bytes();
            rgba.copy_from_slice(&[r, g, b, a]);
        }
        Ok(())
    }

    /// Decodes the frame into packed `0xAARRGGBB` pixels.
    pub(crate) fn decode_argb(
        &mut self,
        width: u32,
        height: u32,
        implicit_dimensions: bool,
    ) -> Result<Vec<u32>, DecodingError> {
        if implicit_dimensions {
            self.width = u16::try_from(width).map_err(|_| DecodingError::ImageTooLarge)?;
            self.height = u16::try_from(height).map_err(|_| DecodingError::ImageTooLarge)?;
        } else {
            let header = LosslessHeader::read(&mut self.bit_reader)?;
            if u32::from(header.width) != width || u32::from(header.height) != height {
                return Err(DecodingError::InconsistentImageSizes);
            }
            self.width = header.width;
            self.height = header.height;
        }

        let coded_width = self.read_transforms()?;
        let mut data = self.decode_image_stream(coded_width, self.height, true)?;

        for (transform, width) in self.transforms.iter().rev() {
            transform.apply_inverse(&mut data, *width, self.height)?;
        }

        Ok(data)
    }

    /// Reads the transform list and returns the width of the coded image.
    fn read_transforms(&mut self) -> Result<u16, DecodingError> {
        let mut xsize = self.width;
        let mut seen = [false; 4];

        while self.bit_reader.read_bit()? {
            let transform_type = self.bit_reader.read_bits(2)?;
            if seen[transform_type as usize] {
                return Err(DecodingError::TransformError);
            }
            seen[transform_type as usize] = true;

            let transform = match transform_type {
                0 | 1 => {
                    let size_bits = self.bit_reader.read_bits(3)? as u8 + 2;
                    let block_xsize = subsample_size(xsize, size_bits);
                    let block_ysize = subsample_size(self.height, size_bits);
                    let data = self.decode_image_stream(block_xsize, block_ysize, false)?;
                    log::debug!(
                        "VP8L {} transform: block size {}",
                        if transform_type == 0 { "predictor" } else { "color" },
                        1u32 << size_bits
                    );
                    if transform_type == 0 {
                        Transform::Predictor {
                            size_bits,
                            predictor_data: data,
                        }
                    } else {
                        Transform::Color {
                            size_bits,
                            transform_data: data,
                        }
                    }
                }
                2 => {
                    log::debug!("VP8L subtract green transform");
                    Transform::SubtractGreen
                }
                _ => {
                    let table_size = self.bit_reader.read_bits(8)? as u16 + 1;
                    let mut table_data = self.decode_image_stream(table_size, 1, false)?;
                    for i in 1..table_data.len() {
                        table_data[i] = add_pixels(table_data[i], table_data[i - 1]);
                    }
                    log::debug!("VP8L color indexing transform: {table_size} colors");
                    Transform::ColorIndexing {
                        table_size,
                        table_data,
                    }
                }
            };

            let next_xsize = transform.coded_width(xsize);
            self.transforms.push((transform, xsize));
            xsize = next_xsize;
        }

        Ok(xsize)
    }

    /// Decodes one entropy-coded image. Only the main ARGB image may carry
    /// meta prefix codes.
    fn decode_image_stream(
        &mut self,
        xsize: u16,
        ysize: u16,
        is_argb_img: bool,
    ) -> Result<Vec<u32>, DecodingError> {
        let color_cache = self.read_color_cache()?;
        let cache_size = color_cache.as_ref().map_or(0, ColorCache::len);
        let huffman_info = self.read_huffman_codes(is_argb_img, xsize, ysize, cache_size)?;
        self.decode_image_data(xsize, ysize, &huffman_info, color_cache)
    }

    fn read_color_cache(&mut self) -> Result<Option<ColorCache>, DecodingError> {
        if !self.bit_reader.read_bit()? {
            return Ok(None);
        }
        let bits = self.bit_reader.read_bits(4)? as u8;
        if bits == 0 || bits > MAX_COLOR_CACHE_BITS {
            return Err(DecodingError::InvalidColorCacheBits(bits));
        }
        log::trace!("VP8L color cache: {bits} bits");
        Ok(Some(ColorCache::new(bits)))
    }

    fn read_huffman_codes(
        &mut self,
        read_meta: bool,
        xsize: u16,
        ysize: u16,
        cache_size: u16,
    ) -> Result<HuffmanInfo, DecodingError> {
        let mut num_groups = 1;
        let mut huffman_bits = 0;
        let mut huffman_xsize = 0;
        let mut entropy_image = Vec::new();

        if read_meta && self.bit_reader.read_bit()? {
            huffman_bits = self.bit_reader.read_bits(3)? as u8 + 2;
            huffman_xsize = subsample_size(xsize, huffman_bits);
            let huffman_ysize = subsample_size(ysize, huffman_bits);

            entropy_image = self.decode_image_stream(huffman_xsize, huffman_ysize, false)?;
            for pixel in entropy_image.iter_mut() {
                let meta_code = (*pixel >> 8) & 0xffff;
                *pixel = meta_code;
                num_groups = num_groups.max(meta_code as usize + 1);
            }
            log::debug!(
                "VP8L meta prefix codes: {num_groups} groups, block size {}",
                1u32 << huffman_bits
            );
        }

        let alphabet_sizes = [
            NUM_LITERAL_CODES + NUM_LENGTH_CODES + cache_size,
            NUM_LITERAL_CODES,
            NUM_LITERAL_CODES,
            NUM_LITERAL_CODES,
            NUM_DISTANCE_CODES,
        ];

        let mut groups = Vec::with_capacity(num_groups);
        for _ in 0..num_groups {
            let group: HuffmanCodeGroup = [
                self.read_huffman_code(alphabet_sizes[GREEN])?,
                self.read_huffman_code(alphabet_sizes[RED])?,
                self.read_huffman_code(alphabet_sizes[BLUE])?,
                self.read_huffman_code(alphabet_sizes[ALPHA])?,
                self.read_huffman_code(alphabet_sizes[DIST])?,
            ];
            groups.push(group);
        }

        let mask = if huffman_bits == 0 {
            u16::MAX
        } else {
            (1 << huffman_bits) - 1
        };

        Ok(HuffmanInfo {
            xsize: huffman_xsize,
            bits: huffman_bits,
            mask,
            image: entropy_image,
            groups,
        })
    }

    fn read_huffman_code(&mut self, alphabet_size: u16) -> Result<HuffmanTree, DecodingError> {
        let alphabet_size = usize::from(alphabet_size);
        let simple = self.bit_reader.read_bit()?;

        if simple {
            let num_symbols = self.bit_reader.read_bits(1)? + 1;
            let first_symbol_bits = if self.bit_reader.read_bit()? { 8 } else { 1 };
            let mut code_lengths = vec![0u8; alphabet_size.max(256)];

            let zero_symbol = self.bit_reader.read_bits(first_symbol_bits)? as usize;
            code_lengths[zero_symbol] = 1;
            if num_symbols == 2 {
                let one_symbol = self.bit_reader.read_bits(8)? as usize;
                code_lengths[one_symbol] = 1;
            }

            // Symbols beyond the alphabet are dropped.
            HuffmanTree::build(&code_lengths[..alphabet_size])
        } else {
            let mut code_length_code_lengths = [0u8; CODE_LENGTH_CODES];
            let num_code_lengths = 4 + self.bit_reader.read_bits(4)? as usize;
            for &index in &CODE_LENGTH_CODE_ORDER[..num_code_lengths] {
                code_length_code_lengths[index] = self.bit_reader.read_bits(3)? as u8;
            }

            let code_lengths =
                self.read_huffman_code_lengths(&code_length_code_lengths, alphabet_size)?;
            HuffmanTree::build(&code_lengths)
        }
    }

    fn read_huffman_code_lengths(
        &mut self,
        code_length_code_lengths: &[u8; CODE_LENGTH_CODES],
        num_symbols: usize,
    ) -> Result<Vec<u8>, DecodingError> {
        let table = HuffmanTree::build(code_length_code_lengths)?;

        let mut max_symbol = if self.bit_reader.read_bit()? {
            let length_nbits = 2 + 2 * self.bit_reader.read_bits(3)? as u8;
            let max_symbol = 2 + self.bit_reader.read_bits(length_nbits)? as usize;
            if max_symbol > num_symbols {
                return Err(DecodingError::HuffmanError);
            }
            max_symbol
        } else {
            num_symbols
        };

        let mut code_lengths = vec![0u8; num_symbols];
        let mut prev_code_len = DEFAULT_CODE_LENGTH;
        let mut symbol = 0;

        // `max_symbol` bounds the number of code-length tokens, repeats included.
        while symbol < num_symbols {
            if max_symbol == 0 {
                break;
            }
            max_symbol -= 1;

            let code_len = table.read_symbol(&mut self.bit_reader)? as u8;
            if code_len < 16 {
                code_lengths[symbol] = code_len;
                symbol += 1;
                if code_len != 0 {
                    prev_code_len = code_len;
                }
            } else {
                let slot = usize::from(code_len - 16);
                let extra_bits = CODE_LENGTH_REPEAT_EXTRA_BITS[slot];
                let repeat = self.bit_reader.read_bits(extra_bits)? as usize
                    + CODE_LENGTH_REPEAT_OFFSETS[slot];
                if symbol + repeat > num_symbols {
                    return Err(DecodingError::HuffmanError);
                }

                let length = if code_len == 16 { prev_code_len } else { 0 };
                code_lengths[symbol..symbol + repeat].fill(length);
                symbol += repeat;
            }
        }

        Ok(code_lengths)
    }

    fn decode_image_data(
        &mut self,
        width: u16,
        height: u16,
        huffman_info: &HuffmanInfo,
        mut color_cache: Option<ColorCache>,
    ) -> Result<Vec<u32>, DecodingError> {
        let num_values = usize::from(width) * usize::from(height);
        let mut data = vec![0u32; num_values];

        let mut index = 0;
        let (mut x, mut y) = (0u16, 0u16);
        let mut group = &huffman_info.groups[huffman_info.group_index(x, y)];

        while index < num_values {
            if x & huffman_info.mask == 0 {
                group = huffman_info
                    .groups
                    .get(huffman_info.group_index(x, y))
                    .ok_or(DecodingError::HuffmanError)?;
            }

            let code = group[GREEN].read_symbol(&mut self.bit_reader)?;

            if code < NUM_LITERAL_CODES {
                let red = group[RED].read_symbol(&mut self.bit_reader)?;
                let blue = group[BLUE].read_symbol(&mut self.bit_reader)?;
                let alpha = group[ALPHA].read_symbol(&mut self.bit_reader)?;
                let argb = (u32::from(alpha) << 24)
                    | (u32::from(red) << 16)
                    | (u32::from(code) << 8)
                    | u32::from(blue);

                data[index] = argb;
                if let Some(cache) = color_cache.as_mut() {
                    cache.insert(argb);
                }
                index += 1;
                x += 1;
                if x >= width {
                    x = 0;
                    y += 1;
                }
            } else if code < NUM_LITERAL_CODES + NUM_LENGTH_CODES {
                let length = self.get_copy_distance(code - NUM_LITERAL_CODES)?;
                let dist_symbol = group[DIST].read_symbol(&mut self.bit_reader)?;
                let dist_code = self.get_copy_distance(dist_symbol)?;
                let dist = plane_code_to_distance(width, dist_code);

                if index < dist || num_values - index < length {
                    return Err(DecodingError::BitStreamError);
                }

                for i in index..index + length {
                    data[i] = data[i - dist];
                    if let Some(cache) = color_cache.as_mut() {
                        cache.insert(data[i]);
                    }
                }
                index += length;

                let advanced = usize::from(x) + length;
                x = (advanced % usize::from(width)) as u16;
                y += (advanced / usize::from(width)) as u16;

                if index < num_values && x & huffman_info.mask != 0 {
                    group = huffman_info
                        .groups
                        .get(huffman_info.group_index(x, y))
                        .ok_or(DecodingError::HuffmanError)?;
                }
            } else {
                let key = usize::from(code - NUM_LITERAL_CODES - NUM_LENGTH_CODES);
                let argb = color_cache
                    .as_ref()
                    .and_then(|cache| cache.lookup(key))
                    .ok_or(DecodingError::BitStreamError)?;

                data[index] = argb;
                if let Some(cache) = color_cache.as_mut() {
                    cache.insert(argb);
                }
                index += 1;
                x += 1;
                if x >= width {
                    x = 0;
                    y += 1;
                }
            }
        }

        Ok(data)
    }

    /// Maps a length or distance prefix symbol to its value, reading the
    /// extra bits it calls for.
    fn get_copy_distance(&mut self, prefix_symbol: u16) -> Result<usize, DecodingError> {
        if prefix_symbol < 4 {
            return Ok(usize::from(prefix_symbol) + 1);
        }
        let extra_bits = ((prefix_symbol - 2) >> 1) as u8;
        let offset = usize::from(2 + (prefix_symbol & 1)) << extra_bits;
        Ok(offset + self.bit_reader.read_bits(extra_bits)? as usize + 1)
    }
}

/// Converts a distance code to a pixel distance. Codes 1..=120 are
/// neighbourhood offsets; larger codes are plain distances plus 120.
fn plane_code_to_distance(xsize: u16, plane_code: usize) -> usize {
    if plane_code > DISTANCE_MAP.len() {
        plane_code - DISTANCE_MAP.len()
    } else {
        let (dx, dy) = DISTANCE_MAP[plane_code - 1];
        let dist = i32::from(dy) * i32::from(xsize) + i32::from(dx);
        dist.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::bit_reader::tests::BitWriter;

    fn write_header(w: &mut BitWriter, width: u32, height: u32) {
        w.write(0x2f, 8);
        w.write(width - 1, 14);
        w.write(height - 1, 14);
        w.write(0, 1);
        w.write(0, 3);
    }

    /// A simple prefix code with a single symbol.
    fn write_single_symbol(w: &mut BitWriter, symbol: u8) {
        w.write(1, 1);
        w.write(0, 1);
        if symbol < 2 {
            w.write(0, 1);
            w.write(u32::from(symbol), 1);
        } else {
            w.write(1, 1);
            w.write(u32::from(symbol), 8);
        }
    }

    #[test]
    fn short_copy_codes_read_no_bits() {
        let mut decoder = LosslessDecoder::new(&[]);
        for code in 0..4u16 {
            assert_eq!(decoder.get_copy_distance(code).unwrap(), usize::from(code) + 1);
        }
    }

    #[test]
    fn copy_code_extra_bits() {
        let mut w = BitWriter::default();
        w.write(0, 1);
        w.write(1, 1);
        w.write(0b11, 1);
        let data = w.finish();
        let mut decoder = LosslessDecoder::new(&data);
        assert_eq!(decoder.get_copy_distance(4).unwrap(), 5);
        assert_eq!(decoder.get_copy_distance(4).unwrap(), 6);
        // code 5: (3 << 1) + 1 + 1
        assert_eq!(decoder.get_copy_distance(5).unwrap(), 8);
    }

    #[test]
    fn distance_map_lookup() {
        assert_eq!(plane_code_to_distance(10, 1), 10);
        assert_eq!(plane_code_to_distance(10, 2), 1);
        assert_eq!(plane_code_to_distance(10, 4), 9);
        assert_eq!(plane_code_to_distance(10, 121), 1);
        assert_eq!(plane_code_to_distance(10, 500), 380);
        // (-1, 1) on a one-pixel-wide image clamps to 1
        assert_eq!(plane_code_to_distance(1, 4), 1);
    }

    #[test]
    fn color_cache_hash() {
        let mut cache = ColorCache::new(4);
        let argb = 0xff12_3456;
        cache.insert(argb);
        let key = (0x1e35_a7bd_u32.wrapping_mul(argb) >> 28) as usize;
        assert_eq!(cache.lookup(key), Some(argb));
        assert_eq!(cache.lookup(16), None);
    }

    #[test]
    fn single_pixel_needs_no_pixel_bits() {
        let mut w = BitWriter::default();
        write_header(&mut w, 1, 1);
        w.write(0, 1); // no transforms
        w.write(0, 1); // no color cache
        w.write(0, 1); // no meta codes
        write_single_symbol(&mut w, 0x80);
        write_single_symbol(&mut w, 0x40);
        write_single_symbol(&mut w, 0x20);
        write_single_symbol(&mut w, 0xff);
        write_single_symbol(&mut w, 0);
        let data = w.finish();

        let argb = LosslessDecoder::new(&data).decode_argb(1, 1, false).unwrap();
        assert_eq!(argb, vec![0xff40_8020]);
    }

    #[test]
    fn backward_reference_copies_pixels() {
        let mut w = BitWriter::default();
        write_header(&mut w, 4, 1);
        w.write(0, 1);
        w.write(0, 1);
        w.write(0, 1);

        // Green: normal code giving symbols 64 and 257 one bit each.
        w.write(0, 1);
        w.write(0, 4); // four code length code lengths: 17, 18, 0, 1
        for length in [0, 1, 0, 1] {
            w.write(length, 3);
        }
        w.write(0, 1); // no max symbol
        // Code length code: symbol 1 is "0", symbol 18 is "1".
        let zeros = |w: &mut BitWriter, n: u32| {
            w.write(1, 1);
            w.write(n - 11, 7);
        };
        zeros(&mut w, 64);
        w.write(0, 1); // symbol 64: length 1
        zeros(&mut w, 138);
        zeros(&mut w, 54);
        w.write(0, 1); // symbol 257: length 1
        zeros(&mut w, 22);

        write_single_symbol(&mut w, 0);
        write_single_symbol(&mut w, 0);
        write_single_symbol(&mut w, 0xff);
        write_single_symbol(&mut w, 1); // distance code 2: one pixel left

        w.write(0, 1); // literal
        w.write(1, 1); // copy of length 2
        w.write(0, 1); // literal
        let data = w.finish();

        let mut rgba = [0u8; 16];
        LosslessDecoder::new(&data)
            .decode_frame(4, 1, false, &mut rgba)
            .unwrap();
        for pixel in rgba.chunks_exact(4) {
            assert_eq!(pixel, [0, 0x40, 0, 0xff]);
        }
    }

    #[test]
    fn repeated_transform_is_rejected() {
        let mut w = BitWriter::default();
        write_header(&mut w, 1, 1);
        w.write(1, 1);
        w.write(2, 2);
        w.write(1, 1);
        w.write(2, 2);
        let data = w.finish();

        assert!(matches!(
            LosslessDecoder::new(&data).decode_argb(1, 1, false),
            Err(DecodingError::TransformError)
        ));
    }

    #[test]
    fn header_size_mismatch() {
        let mut w = BitWriter::default();
        write_header(&mut w, 3, 2);
        let data = w.finish();
        assert!(matches!(
            LosslessDecoder::new(&data).decode_argb(2, 3, false),
            Err(DecodingError::InconsistentImageSizes)
        ));
    }

    #[test]
    fn invalid_color_cache_bits() {
        let mut w = BitWriter::default();
        write_header(&mut w, 1, 1);
        w.write(0, 1);
        w.write(1, 1);
        w.write(12, 4);
        let data = w.finish();
        assert!(matches!(
            LosslessDecoder::new(&data).decode_argb(1, 1, false),
            Err(DecodingError::InvalidColorCacheBits(12))
        ));
    }
}
