//! Utilities for doing the YUV -> RGB conversion
//! The images are encoded in the Y'CbCr format as detailed here: <https://en.wikipedia.org/wiki/YCbCr>
//! so need to be converted to RGB to be displayed
//!
//! The y buffer is the same size as the pixel buffer so that maps 1-1 but the
//! u and v buffers are half the size of the pixel buffer in each direction, so
//! they have to be scaled up. The simple way is to take each u/v value and
//! associate it with the 2x2 pixels it covers.
//!
//! Fancy upsampling interpolates u and v instead: every pixel mixes its own
//! chroma sample with the nearest horizontal, vertical and diagonal ones as
//! `(9*main + 3*horizontal + 3*vertical + diagonal + 8) / 16`. At the image
//! edges the missing neighbour is replaced by the main sample.

use alloc::vec;
use alloc::vec::Vec;

// constants used for rgb -> yuv conversion, using ones from libwebp
const YUV_FIX: i32 = 16;
const YUV_HALF: i32 = 1 << (YUV_FIX - 1);

#[inline]
fn clip(v: i32) -> u8 {
    (v >> 8).clamp(0, 255) as u8
}

/// BT.601 limited range to RGB, 8 fractional bits.
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (i32::from(y) - 16) + 128;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    [
        clip(c + 409 * e),
        clip(c - 100 * d - 208 * e),
        clip(c + 516 * d),
    ]
}

#[inline]
fn set_pixel<const BPP: usize>(out: &mut [u8], y: u8, u: u8, v: u8) {
    out[..3].copy_from_slice(&yuv_to_rgb(y, u, v));
    if BPP == 4 {
        out[3] = 255;
    }
}

/// Fills an rgb(a) buffer of `width * height` pixels, repeating each chroma
/// sample over the 2x2 pixels it covers. Alpha, if any, is set opaque.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fill_rgb_buffer_simple<const BPP: usize>(
    buffer: &mut [u8],
    y_buffer: &[u8],
    u_buffer: &[u8],
    v_buffer: &[u8],
    width: usize,
    height: usize,
    luma_stride: usize,
    chroma_stride: usize,
) {
    for (row, out) in buffer
        .chunks_exact_mut(width * BPP)
        .take(height)
        .enumerate()
    {
        let y_row = &y_buffer[row * luma_stride..][..width];
        let u_row = &u_buffer[(row / 2) * chroma_stride..];
        let v_row = &v_buffer[(row / 2) * chroma_stride..];

        for (x, (pixel, &y)) in out.chunks_exact_mut(BPP).zip(y_row).enumerate() {
            set_pixel::<BPP>(pixel, y, u_row[x / 2], v_row[x / 2]);
        }
    }
}

/// Index of the secondary chroma sample for luma coordinate `i`: the one
/// after the main sample for odd `i`, the one before for even `i`.
#[inline]
fn secondary(i: usize, len: usize) -> usize {
    if i % 2 == 1 {
        (i / 2 + 1).min(len - 1)
    } else {
        (i / 2).saturating_sub(1)
    }
}

#[inline]
fn get_fancy_chroma_value(main: u8, secondary1: u8, secondary2: u8, tertiary: u8) -> u8 {
    let val0 = u16::from(main);
    let val1 = u16::from(secondary1);
    let val2 = u16::from(secondary2);
    let val3 = u16::from(tertiary);
    ((9 * val0 + 3 * val1 + 3 * val2 + val3 + 8) / 16) as u8
}

/// Fills an rgb(a) buffer of `width * height` pixels with bilinear chroma
/// upsampling. Alpha, if any, is set opaque.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fill_rgb_buffer_fancy<const BPP: usize>(
    buffer: &mut [u8],
    y_buffer: &[u8],
    u_buffer: &[u8],
    v_buffer: &[u8],
    width: usize,
    height: usize,
    luma_stride: usize,
    chroma_stride: usize,
) {
    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);

    for (row, out) in buffer
        .chunks_exact_mut(width * BPP)
        .take(height)
        .enumerate()
    {
        let y_row = &y_buffer[row * luma_stride..][..width];
        let main_row = (row / 2) * chroma_stride;
        let near_row = secondary(row, chroma_height) * chroma_stride;

        let sample = |plane: &[u8], x: usize| {
            let main = x / 2;
            let near = secondary(x, chroma_width);
            get_fancy_chroma_value(
                plane[main_row + main],
                plane[main_row + near],
                plane[near_row + main],
                plane[near_row + near],
            )
        };

        for (x, (pixel, &y)) in out.chunks_exact_mut(BPP).zip(y_row).enumerate() {
            set_pixel::<BPP>(pixel, y, sample(u_buffer, x), sample(v_buffer, x));
        }
    }
}

// values come from libwebp
// Y = 0.2568 * R + 0.5041 * G + 0.0979 * B + 16
// U = -0.1482 * R - 0.2910 * G + 0.4392 * B + 128
// V = 0.4392 * R - 0.3678 * G - 0.0714 * B + 128

// this is converted to 16 bit fixed point by multiplying by 2^16
// and shifting back

fn rgb_to_y(rgb: &[u8]) -> u8 {
    let luma = 16839 * i32::from(rgb[0]) + 33059 * i32::from(rgb[1]) + 6420 * i32::from(rgb[2]);
    ((luma + YUV_HALF + (16 << YUV_FIX)) >> YUV_FIX) as u8
}

fn rgb_to_u_raw(rgb: &[u8]) -> i32 {
    -9719 * i32::from(rgb[0]) - 19081 * i32::from(rgb[1])
        + 28800 * i32::from(rgb[2])
        + (128 << YUV_FIX)
}

fn rgb_to_v_raw(rgb: &[u8]) -> i32 {
    28800 * i32::from(rgb[0]) - 24116 * i32::from(rgb[1]) - 4684 * i32::from(rgb[2])
        + (128 << YUV_FIX)
}

/// Average of four raw chroma values, rounded.
fn average_chroma(raw: [i32; 4]) -> u8 {
    let sum: i32 = raw.iter().sum();
    ((sum + (YUV_HALF << 2)) >> (YUV_FIX + 2)).clamp(0, 255) as u8
}

/// Converts a packed rgb(a) image into tightly packed Y, U and V planes, in
/// that order. Chroma is the average of each 2x2 block, with the last row
/// and column repeated for odd sizes.
pub(crate) fn convert_image_yuv<const BPP: usize>(
    image_data: &[u8],
    width: usize,
    height: usize,
) -> Vec<u8> {
    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);
    let chroma_size = chroma_width * chroma_height;
    let mut out = vec![0u8; width * height + 2 * chroma_size];

    let (y_plane, chroma) = out.split_at_mut(width * height);
    let (u_plane, v_plane) = chroma.split_at_mut(chroma_size);

    for (y, pixel) in y_plane.iter_mut().zip(image_data.chunks_exact(BPP)) {
        *y = rgb_to_y(pixel);
    }

    let pixel = |x: usize, y: usize| &image_data[(y * width + x) * BPP..][..BPP];
    for cy in 0..chroma_height {
        let (y0, y1) = (2 * cy, (2 * cy + 1).min(height - 1));
        for cx in 0..chroma_width {
            let (x0, x1) = (2 * cx, (2 * cx + 1).min(width - 1));
            let block = [pixel(x0, y0), pixel(x1, y0), pixel(x0, y1), pixel(x1, y1)];
            u_plane[cy * chroma_width + cx] = average_chroma(block.map(rgb_to_u_raw));
            v_plane[cy * chroma_width + cx] = average_chroma(block.map(rgb_to_v_raw));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fancy_grid() {
        #[rustfmt::skip]
        let y_buffer = [
            77, 162, 202, 185,
            28, 13, 199, 182,
            135, 147, 164, 135,
            66, 27, 171, 130,
        ];

        #[rustfmt::skip]
        let u_buffer = [
            34, 101,
            123, 163
        ];

        #[rustfmt::skip]
        let v_buffer = [
            97, 167,
            149, 23,
        ];

        let mut rgb_buffer = [0u8; 16 * 3];
        fill_rgb_buffer_fancy::<3>(&mut rgb_buffer, &y_buffer, &u_buffer, &v_buffer, 4, 4, 4, 2);

        #[rustfmt::skip]
        let upsampled_u_buffer = [
            34, 51, 84, 101,
            56, 71, 101, 117,
            101, 112, 136, 148,
            123, 133, 153, 163,
        ];

        #[rustfmt::skip]
        let upsampled_v_buffer = [
            97, 115, 150, 167,
            110, 115, 126, 131,
            136, 117, 78, 59,
            149, 118, 55, 23,
        ];

        let mut upsampled_rgb_buffer = [0u8; 16 * 3];
        for (((rgb_val, y), u), v) in upsampled_rgb_buffer
            .chunks_exact_mut(3)
            .zip(y_buffer)
            .zip(upsampled_u_buffer)
            .zip(upsampled_v_buffer)
        {
            rgb_val.copy_from_slice(&yuv_to_rgb(y, u, v));
        }

        assert_eq!(rgb_buffer, upsampled_rgb_buffer);
    }

    #[test]
    fn test_yuv_conversions() {
        assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
        assert_eq!(yuv_to_rgb(128, 128, 128), [130, 130, 130]);
        assert_eq!(yuv_to_rgb(203, 40, 42), [80, 255, 40]);
    }

    #[test]
    fn simple_upsampling_crops_padded_planes() {
        // 3x3 image stored with luma stride 4 and chroma stride 2.
        #[rustfmt::skip]
        let y_buffer = [
            16, 235, 16, 99,
            235, 16, 235, 99,
            16, 16, 16, 99,
            99, 99, 99, 99,
        ];
        let u_buffer = [128, 128, 128, 128];
        let v_buffer = [128, 128, 128, 128];

        let mut rgba = [0u8; 3 * 3 * 4];
        fill_rgb_buffer_simple::<4>(&mut rgba, &y_buffer, &u_buffer, &v_buffer, 3, 3, 4, 2);

        #[rustfmt::skip]
        let expected_luma = [
            0, 255, 0,
            255, 0, 255,
            0, 0, 0,
        ];
        for (pixel, &luma) in rgba.chunks_exact(4).zip(&expected_luma) {
            assert_eq!(pixel, [luma, luma, luma, 255]);
        }
    }

    #[test]
    fn simple_upsampling_shares_chroma_per_block() {
        let y_buffer = [128u8; 4];
        let u_buffer = [200u8];
        let v_buffer = [60u8];
        let mut rgb = [0u8; 2 * 2 * 3];
        fill_rgb_buffer_simple::<3>(&mut rgb, &y_buffer, &u_buffer, &v_buffer, 2, 2, 2, 1);
        let first = [rgb[0], rgb[1], rgb[2]];
        assert!(rgb.chunks_exact(3).all(|p| p == first));
        assert_eq!(first, yuv_to_rgb(128, 200, 60));
    }

    #[test]
    fn rgb_to_yuv_greys() {
        let image = [
            0, 0, 0, 255, //
            255, 255, 255, 255, //
            128, 128, 128, 255,
        ];
        let out = convert_image_yuv::<4>(&image, 3, 1);
        assert_eq!(out.len(), 3 + 2 + 2);
        assert_eq!(&out[..3], &[16, 235, 126]);
        // Neutral greys carry no chroma.
        assert_eq!(&out[3..], &[128, 128, 128, 128]);
    }

    #[test]
    fn rgb_to_yuv_averages_blocks() {
        // Saturated red on the left, blue on the right.
        let image = [
            255, 0, 0, 0, 0, 255, //
            255, 0, 0, 0, 0, 255,
        ];
        let out = convert_image_yuv::<3>(&image, 2, 2);
        let u_red = rgb_to_u_raw(&[255, 0, 0]);
        let u_blue = rgb_to_u_raw(&[0, 0, 255]);
        assert_eq!(out[4], average_chroma([u_red, u_blue, u_red, u_blue]));
        let v_red = rgb_to_v_raw(&[255, 0, 0]);
        let v_blue = rgb_to_v_raw(&[0, 0, 255]);
        assert_eq!(out[5], average_chroma([v_red, v_blue, v_red, v_blue]));
    }
}
