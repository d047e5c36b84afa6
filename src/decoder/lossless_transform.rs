//! Inverse VP8L image transforms.
//!
//! Pixels are packed `0xAARRGGBB`. All channel arithmetic wraps modulo 256.

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodingError;

const ARGB_BLACK: u32 = 0xff00_0000;

/// A transform as declared in the bitstream, with its side data decoded.
#[derive(Debug, Clone)]
pub(crate) enum Transform {
    Predictor {
        size_bits: u8,
        predictor_data: Vec<u32>,
    },
    Color {
        size_bits: u8,
        transform_data: Vec<u32>,
    },
    SubtractGreen,
    ColorIndexing {
        table_size: u16,
        table_data: Vec<u32>,
    },
}

impl Transform {
    /// Width of the image coded after this transform, given the width
    /// before it.
    pub(crate) fn coded_width(&self, width: u16) -> u16 {
        match self {
            Self::ColorIndexing { table_size, .. } => {
                let xbits = color_indexing_xbits(*table_size);
                subsample_size(width, xbits)
            }
            _ => width,
        }
    }

    /// Undoes the transform in place. `width` is the image width that was
    /// current when the transform was declared.
    pub(crate) fn apply_inverse(
        &self,
        image: &mut Vec<u32>,
        width: u16,
        height: u16,
    ) -> Result<(), DecodingError> {
        let width = usize::from(width);
        let height = usize::from(height);
        match self {
            Self::Predictor {
                size_bits,
                predictor_data,
            } => apply_predictor_transform(image, width, height, *size_bits, predictor_data),
            Self::Color {
                size_bits,
                transform_data,
            } => apply_color_transform(image, width, height, *size_bits, transform_data),
            Self::SubtractGreen => {
                apply_subtract_green_transform(image);
                Ok(())
            }
            Self::ColorIndexing {
                table_size,
                table_data,
            } => {
                *image = apply_color_indexing_transform(
                    image,
                    width,
                    height,
                    *table_size,
                    table_data,
                )?;
                Ok(())
            }
        }
    }
}

/// `ceil(size / (1 << bits))`
pub(crate) fn subsample_size(size: u16, bits: u8) -> u16 {
    ((u32::from(size) + (1 << bits) - 1) >> bits) as u16
}

/// log2 of the number of palette indices packed into one pixel.
pub(crate) fn color_indexing_xbits(table_size: u16) -> u8 {
    match table_size {
        0..=2 => 3,
        3..=4 => 2,
        5..=16 => 1,
        _ => 0,
    }
}

#[inline]
fn channels(p: u32) -> [u8; 4] {
    p.to_be_bytes()
}

#[inline]
pub(crate) fn add_pixels(a: u32, b: u32) -> u32 {
    let alpha_green = (a & 0xff00_ff00).wrapping_add(b & 0xff00_ff00);
    let red_blue = (a & 0x00ff_00ff).wrapping_add(b & 0x00ff_00ff);
    (alpha_green & 0xff00_ff00) | (red_blue & 0x00ff_00ff)
}

#[inline]
fn average2(a: u32, b: u32) -> u32 {
    (((a ^ b) & 0xfefe_fefe) >> 1) + (a & b)
}

#[inline]
fn select(left: u32, top: u32, top_left: u32) -> u32 {
    let distance = |x: u32| -> i32 {
        channels(x)
            .iter()
            .zip(channels(top_left).iter())
            .map(|(&c, &tl)| (i32::from(c) - i32::from(tl)).abs())
            .sum()
    };
    // Estimates how far each neighbour is from `left + top - top_left`.
    let predict_left = distance(top);
    let predict_top = distance(left);
    if predict_left < predict_top {
        left
    } else {
        top
    }
}

#[inline]
fn clamp_add_subtract_full(a: u32, b: u32, c: u32) -> u32 {
    let (a, b, c) = (channels(a), channels(b), channels(c));
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = (i32::from(a[i]) + i32::from(b[i]) - i32::from(c[i])).clamp(0, 255) as u8;
    }
    u32::from_be_bytes(out)
}

#[inline]
fn clamp_add_subtract_half(a: u32, b: u32) -> u32 {
    let (a, b) = (channels(a), channels(b));
    let mut out = [0u8; 4];
    for i in 0..4 {
        let a = i32::from(a[i]);
        out[i] = (a + (a - i32::from(b[i])) / 2).clamp(0, 255) as u8;
    }
    u32::from_be_bytes(out)
}

/// Prediction for pixel `index` of a row other than the first, in a column
/// other than the first. `TR` of the last column wraps to the start of the
/// current row, which linear indexing gives for free.
#[inline]
fn predict(mode: u8, image: &[u32], index: usize, width: usize) -> u32 {
    let left = image[index - 1];
    let top = image[index - width];
    let top_right = || image[index - width + 1];
    let top_left = image[index - width - 1];
    match mode {
        1 => left,
        2 => top,
        3 => top_right(),
        4 => top_left,
        5 => average2(average2(left, top_right()), top),
        6 => average2(left, top_left),
        7 => average2(left, top),
        8 => average2(top_left, top),
        9 => average2(top, top_right()),
        10 => average2(average2(left, top_left), average2(top, top_right())),
        11 => select(left, top, top_left),
        12 => clamp_add_subtract_full(left, top, top_left),
        13 => clamp_add_subtract_half(average2(left, top), top_left),
        // 0, and the unused 14 and 15
        _ => ARGB_BLACK,
    }
}

pub(crate) fn apply_predictor_transform(
    image: &mut [u32],
    width: usize,
    height: usize,
    size_bits: u8,
    predictor_data: &[u32],
) -> Result<(), DecodingError> {
    if image.len() < width * height {
        return Err(DecodingError::TransformError);
    }
    let block_xsize = usize::from(subsample_size(width as u16, size_bits));

    if width == 0 || height == 0 {
        return Ok(());
    }

    image[0] = add_pixels(image[0], ARGB_BLACK);
    for x in 1..width {
        image[x] = add_pixels(image[x], image[x - 1]);
    }

    for y in 1..height {
        let row = y * width;
        image[row] = add_pixels(image[row], image[row - width]);

        let block_row = (y >> size_bits) * block_xsize;
        for x in 1..width {
            let block = predictor_data
                .get(block_row + (x >> size_bits))
                .ok_or(DecodingError::TransformError)?;
            let mode = ((block >> 8) & 0xf) as u8;
            let index = row + x;
            image[index] = add_pixels(image[index], predict(mode, image, index, width));
        }
    }

    Ok(())
}

#[inline]
fn color_transform_delta(t: i8, c: i8) -> i32 {
    (i32::from(t) * i32::from(c)) >> 5
}

pub(crate) fn apply_color_transform(
    image: &mut [u32],
    width: usize,
    height: usize,
    size_bits: u8,
    transform_data: &[u32],
) -> Result<(), DecodingError> {
    let block_xsize = usize::from(subsample_size(width as u16, size_bits));

    for (y, row) in image.chunks_exact_mut(width.max(1)).take(height).enumerate() {
        for (x, pixel) in row.iter_mut().enumerate() {
            let element = transform_data
                .get((y >> size_bits) * block_xsize + (x >> size_bits))
                .ok_or(DecodingError::TransformError)?;
            let [_, red_to_blue, green_to_blue, green_to_red] = channels(*element);
            let [alpha, red, green, blue] = channels(*pixel);

            let green = green as i8;
            let red = (i32::from(red) + color_transform_delta(green_to_red as i8, green)) as u8;
            let blue = i32::from(blue)
                + color_transform_delta(green_to_blue as i8, green)
                + color_transform_delta(red_to_blue as i8, red as i8);

            *pixel = u32::from_be_bytes([alpha, red, green as u8, blue as u8]);
        }
    }

    Ok(())
}

pub(crate) fn apply_subtract_green_transform(image: &mut [u32]) {
    for pixel in image.iter_mut() {
        let green = (*pixel >> 8) & 0xff;
        *pixel = add_pixels(*pixel, (green << 16) | green);
    }
}

/// Expands packed palette indices into `width * height` pixels. Indices
/// beyond the palette become transparent black.
pub(crate) fn apply_color_indexing_transform(
    image: &[u32],
    width: usize,
    height: usize,
    table_size: u16,
    table_data: &[u32],
) -> Result<Vec<u32>, DecodingError> {
    let xbits = color_indexing_xbits(table_size);
    let coded_width = usize::from(subsample_size(width as u16, xbits));
    if image.len() < coded_width * height {
        return Err(DecodingError::TransformError);
    }

    let bits_per_index = 8 >> xbits;
    let index_mask = (1u32 << bits_per_index) - 1;
    let per_pixel_mask = (1usize << xbits) - 1;
    let lookup = |index: u32| table_data.get(index as usize).copied().unwrap_or(0);

    let mut output = vec![0u32; width * height];
    for (out_row, coded_row) in output
        .chunks_exact_mut(width.max(1))
        .zip(image.chunks_exact(coded_width.max(1)))
    {
        for (x, pixel) in out_row.iter_mut().enumerate() {
            let packed = (coded_row[x >> xbits] >> 8) & 0xff;
            let shift = (x & per_pixel_mask) * bits_per_index;
            *pixel = lookup((packed >> shift) & index_mask);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn pixel_arithmetic() {
        assert_eq!(add_pixels(0xff10_20f0, 0x0220_e020), 0x0130_0010);
        assert_eq!(average2(0x0002_04ff, 0x0004_0801), 0x0003_0680);
        assert_eq!(
            clamp_add_subtract_full(0x10f0_0010, 0x2020_0000, 0x0010_0020),
            0x30ff_0000
        );
        assert_eq!(clamp_add_subtract_half(0x4000_ff00, 0x0000_0000), 0x6000_ff00);
    }

    #[test]
    fn select_prefers_closer_neighbour() {
        let top_left = 0xff00_0000;
        // left is near top_left, so the gradient estimate lands on top
        assert_eq!(select(0xff01_0101, 0xff80_8080, top_left), 0xff80_8080);
        assert_eq!(select(0xff80_8080, 0xff01_0101, top_left), 0xff80_8080);
        // ties pick top
        assert_eq!(select(0xff00_0001, 0xff00_0100, top_left), 0xff00_0100);
    }

    #[test]
    fn predictor_edges_and_top_mode() {
        // 2x2, one block using mode 2 (top).
        let mut image = vec![0x0001_0203, 0x0000_0001, 0x0000_0000, 0x0000_0100];
        apply_predictor_transform(&mut image, 2, 2, 2, &[2 << 8]).unwrap();
        assert_eq!(
            image,
            vec![0xff01_0203, 0xff01_0204, 0xff01_0203, 0xff01_0304]
        );
    }

    #[test]
    fn predictor_padding_modes_are_black() {
        let mut image = vec![0x0000_0000; 4];
        image[3] = 0x0000_0005;
        apply_predictor_transform(&mut image, 2, 2, 2, &[14 << 8]).unwrap();
        assert_eq!(image[3], 0xff00_0005);
    }

    #[test]
    fn color_transform_uses_signed_fixed_point() {
        // green_to_red = 1.0, green_to_blue = -1.0, red_to_blue = 0
        let element = u32::from_be_bytes([0xff, 0x00, 0xe0, 0x20]);
        let mut image = vec![u32::from_be_bytes([0xff, 0x05, 0x10, 0x40])];
        apply_color_transform(&mut image, 1, 1, 2, &[element]).unwrap();
        assert_eq!(image[0], u32::from_be_bytes([0xff, 0x15, 0x10, 0x30]));
    }

    #[test]
    fn subtract_green_adds_green_back() {
        let mut image = vec![0x80f0_2010, 0x0001_ff02];
        apply_subtract_green_transform(&mut image);
        assert_eq!(image, vec![0x8010_2030, 0x0000_ff01]);
    }

    fn pack_indices(indices: &[u8], width: usize, table_size: u16) -> Vec<u32> {
        let xbits = color_indexing_xbits(table_size);
        let bits_per_index = 8 >> xbits;
        let coded_width = usize::from(subsample_size(width as u16, xbits));
        let height = indices.len() / width;
        let mut coded = vec![0u32; coded_width * height];
        for y in 0..height {
            for x in 0..width {
                let shift = (x & ((1 << xbits) - 1)) * bits_per_index;
                coded[y * coded_width + (x >> xbits)] |=
                    u32::from(indices[y * width + x]) << (8 + shift);
            }
        }
        coded
    }

    #[test]
    fn color_indexing_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        // one table size per packing density, width leaves a partial byte
        for table_size in [2u16, 4, 16, 256] {
            let width = 13;
            let height = 3;
            let table: Vec<u32> = (0..table_size).map(|_| rng.gen()).collect();
            let indices: Vec<u8> = (0..width * height)
                .map(|_| rng.gen_range(0..table_size) as u8)
                .collect();

            let coded = pack_indices(&indices, width, table_size);
            let expected: Vec<u32> = indices.iter().map(|&i| table[usize::from(i)]).collect();
            let decoded =
                apply_color_indexing_transform(&coded, width, height, table_size, &table).unwrap();
            assert_eq!(decoded, expected, "table size {table_size}");
        }
    }

    #[test]
    fn out_of_palette_index_is_transparent_black() {
        // three colours packed two bits each; index 3 is past the end
        let table = [0xff11_1111, 0xff22_2222, 0xff33_3333];
        let coded = pack_indices(&[0, 3, 2], 3, 3);
        let decoded = apply_color_indexing_transform(&coded, 3, 1, 3, &table).unwrap();
        assert_eq!(decoded, vec![0xff11_1111, 0, 0xff33_3333]);
    }
}
