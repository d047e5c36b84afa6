//! Intra prediction for VP8 macroblocks and 4x4 subblocks.
//!
//! Prediction works inside a small bordered workspace: row 0 holds the
//! pixels above the block (plus the above-right extension for luma) and
//! column 0 holds the pixels to its left. The reconstructed block lives at
//! offset `(1, 1)`.

use super::types::{ChromaMode, IntraMode, LumaMode};

/// Luma workspace stride: 1 left pixel, 16 pixels, 4 above-right, padding.
pub(crate) const LUMA_STRIDE: usize = 32;
/// Luma workspace size: the border row plus 16 rows.
pub(crate) const LUMA_BLOCK_SIZE: usize = LUMA_STRIDE * (1 + 16);

/// Chroma workspace stride: 1 left pixel, 8 pixels.
pub(crate) const CHROMA_STRIDE: usize = 1 + 8;
/// Chroma workspace size: the border row plus 8 rows.
pub(crate) const CHROMA_BLOCK_SIZE: usize = CHROMA_STRIDE * (1 + 8);

/// Value used for the missing row above the top macroblock row.
const ABOVE_FILL: u8 = 127;
/// Value used for the missing column left of the first macroblock column.
const LEFT_FILL: u8 = 129;

/// Builds the luma workspace for macroblock `(mbx, mby)`.
///
/// `top` is the unfiltered bottom luma row of the previous macroblock row,
/// covering the whole (macroblock aligned) width. `left[0]` is the top-left
/// corner and `left[1..17]` the column to the left.
pub(crate) fn luma_workspace(
    mbx: usize,
    mby: usize,
    mbw: usize,
    top: &[u8],
    left: &[u8; 17],
) -> [u8; LUMA_BLOCK_SIZE] {
    let mut ws = [0u8; LUMA_BLOCK_SIZE];

    if mby == 0 {
        ws[..21].fill(ABOVE_FILL);
    } else {
        let x = mbx * 16;
        ws[1..17].copy_from_slice(&top[x..x + 16]);
        if mbx + 1 == mbw {
            ws[17..21].fill(top[x + 15]);
        } else {
            ws[17..21].copy_from_slice(&top[x + 16..x + 20]);
        }
        ws[0] = if mbx == 0 { LEFT_FILL } else { left[0] };
    }

    // Subblocks in the right column of rows 1..3 see the macroblock's
    // above-right pixels, not the reconstructed ones.
    for row in [4, 8, 12] {
        ws.copy_within(17..21, row * LUMA_STRIDE + 17);
    }

    for (y, &l) in left[1..].iter().enumerate() {
        ws[(y + 1) * LUMA_STRIDE] = if mbx == 0 { LEFT_FILL } else { l };
    }

    ws
}

/// Builds one chroma workspace; `left` follows the same layout as for luma.
pub(crate) fn chroma_workspace(
    mbx: usize,
    mby: usize,
    top: &[u8],
    left: &[u8; 9],
) -> [u8; CHROMA_BLOCK_SIZE] {
    let mut ws = [0u8; CHROMA_BLOCK_SIZE];

    if mby == 0 {
        ws[..CHROMA_STRIDE].fill(ABOVE_FILL);
    } else {
        ws[1..9].copy_from_slice(&top[mbx * 8..mbx * 8 + 8]);
        ws[0] = if mbx == 0 { LEFT_FILL } else { left[0] };
    }

    for (y, &l) in left[1..].iter().enumerate() {
        ws[(y + 1) * CHROMA_STRIDE] = if mbx == 0 { LEFT_FILL } else { l };
    }

    ws
}

fn avg2(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b) + 1) >> 1) as u8
}

fn avg3(left: u8, this: u8, right: u8) -> u8 {
    ((u16::from(left) + 2 * u16::from(this) + u16::from(right) + 2) >> 2) as u8
}

fn clamp255(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Whole-block prediction shared by 16x16 luma and 8x8 chroma.
fn predict_block(ws: &mut [u8], size: usize, stride: usize, mode: LumaMode, mbx: usize, mby: usize) {
    match mode {
        LumaMode::DC => {
            let have_above = mby > 0;
            let have_left = mbx > 0;
            let mut sum = 0u32;
            let mut shift = size.trailing_zeros() - 1;
            if have_above {
                sum += ws[1..=size].iter().map(|&p| u32::from(p)).sum::<u32>();
                shift += 1;
            }
            if have_left {
                sum += (1..=size).map(|y| u32::from(ws[y * stride])).sum::<u32>();
                shift += 1;
            }
            let dc = if have_above || have_left {
                ((sum + (1 << (shift - 1))) >> shift) as u8
            } else {
                128
            };
            for y in 1..=size {
                ws[y * stride + 1..][..size].fill(dc);
            }
        }
        LumaMode::V => {
            let (above, rest) = ws.split_at_mut(stride);
            for row in rest.chunks_exact_mut(stride).take(size) {
                row[1..=size].copy_from_slice(&above[1..=size]);
            }
        }
        LumaMode::H => {
            for row in ws.chunks_exact_mut(stride).skip(1).take(size) {
                let left = row[0];
                row[1..=size].fill(left);
            }
        }
        LumaMode::TM => {
            let (above, rest) = ws.split_at_mut(stride);
            let corner = i32::from(above[0]);
            for row in rest.chunks_exact_mut(stride).take(size) {
                let delta = i32::from(row[0]) - corner;
                for (out, &a) in row[1..=size].iter_mut().zip(&above[1..=size]) {
                    *out = clamp255(i32::from(a) + delta);
                }
            }
        }
        // Per-subblock prediction is driven by the caller.
        LumaMode::B => {}
    }
}

/// Fills the 16x16 luma area of `ws` using a whole-macroblock mode.
pub(crate) fn predict_luma(ws: &mut [u8; LUMA_BLOCK_SIZE], mode: LumaMode, mbx: usize, mby: usize) {
    predict_block(ws, 16, LUMA_STRIDE, mode, mbx, mby);
}

/// Fills the 8x8 area of a chroma workspace.
pub(crate) fn predict_chroma(
    ws: &mut [u8; CHROMA_BLOCK_SIZE],
    mode: ChromaMode,
    mbx: usize,
    mby: usize,
) {
    let mode = match mode {
        ChromaMode::DC => LumaMode::DC,
        ChromaMode::V => LumaMode::V,
        ChromaMode::H => LumaMode::H,
        ChromaMode::TM => LumaMode::TM,
    };
    predict_block(ws, 8, CHROMA_STRIDE, mode, mbx, mby);
}

/// Neighbourhood of a 4x4 subblock.
struct Edges {
    corner: u8,
    /// Four pixels above plus four above-right.
    above: [u8; 8],
    left: [u8; 4],
}

impl Edges {
    fn gather(ws: &[u8], x0: usize, y0: usize, stride: usize) -> Self {
        let top = (y0 - 1) * stride + x0;
        let mut above = [0u8; 8];
        above.copy_from_slice(&ws[top..top + 8]);
        Self {
            corner: ws[top - 1],
            above,
            left: core::array::from_fn(|i| ws[(y0 + i) * stride + x0 - 1]),
        }
    }

    /// Left column bottom-up, the corner, then the four pixels above.
    fn edge(&self) -> [u8; 9] {
        let [l0, l1, l2, l3] = self.left;
        let [a0, a1, a2, a3, ..] = self.above;
        [l3, l2, l1, l0, self.corner, a0, a1, a2, a3]
    }
}

fn subblock_pixels(e: &Edges, mode: IntraMode) -> [[u8; 4]; 4] {
    let a = e.above;
    let l = e.left;
    let p = e.corner;
    match mode {
        IntraMode::DC => {
            let sum: u32 = a[..4].iter().chain(&l).map(|&v| u32::from(v)).sum();
            [[((sum + 4) >> 3) as u8; 4]; 4]
        }
        IntraMode::TM => core::array::from_fn(|r| {
            let delta = i32::from(l[r]) - i32::from(p);
            core::array::from_fn(|c| clamp255(i32::from(a[c]) + delta))
        }),
        IntraMode::VE => {
            let row = [
                avg3(p, a[0], a[1]),
                avg3(a[0], a[1], a[2]),
                avg3(a[1], a[2], a[3]),
                avg3(a[2], a[3], a[4]),
            ];
            [row; 4]
        }
        IntraMode::HE => {
            let fill = [
                avg3(p, l[0], l[1]),
                avg3(l[0], l[1], l[2]),
                avg3(l[1], l[2], l[3]),
                avg3(l[2], l[3], l[3]),
            ];
            fill.map(|v| [v; 4])
        }
        IntraMode::LD => {
            let diag: [u8; 7] =
                core::array::from_fn(|i| avg3(a[i], a[i + 1], a[(i + 2).min(7)]));
            core::array::from_fn(|r| core::array::from_fn(|c| diag[r + c]))
        }
        IntraMode::RD => {
            let e = e.edge();
            let diag: [u8; 7] = core::array::from_fn(|i| avg3(e[i], e[i + 1], e[i + 2]));
            core::array::from_fn(|r| core::array::from_fn(|c| diag[3 - r + c]))
        }
        IntraMode::VR => {
            let e = e.edge();
            [
                [avg2(e[4], e[5]), avg2(e[5], e[6]), avg2(e[6], e[7]), avg2(e[7], e[8])],
                [
                    avg3(e[3], e[4], e[5]),
                    avg3(e[4], e[5], e[6]),
                    avg3(e[5], e[6], e[7]),
                    avg3(e[6], e[7], e[8]),
                ],
                [avg3(e[2], e[3], e[4]), avg2(e[4], e[5]), avg2(e[5], e[6]), avg2(e[6], e[7])],
                [
                    avg3(e[1], e[2], e[3]),
                    avg3(e[3], e[4], e[5]),
                    avg3(e[4], e[5], e[6]),
                    avg3(e[5], e[6], e[7]),
                ],
            ]
        }
        IntraMode::VL => [
            [avg2(a[0], a[1]), avg2(a[1], a[2]), avg2(a[2], a[3]), avg2(a[3], a[4])],
            [
                avg3(a[0], a[1], a[2]),
                avg3(a[1], a[2], a[3]),
                avg3(a[2], a[3], a[4]),
                avg3(a[3], a[4], a[5]),
            ],
            [avg2(a[1], a[2]), avg2(a[2], a[3]), avg2(a[3], a[4]), avg3(a[4], a[5], a[6])],
            [
                avg3(a[1], a[2], a[3]),
                avg3(a[2], a[3], a[4]),
                avg3(a[3], a[4], a[5]),
                avg3(a[5], a[6], a[7]),
            ],
        ],
        IntraMode::HD => {
            let e = e.edge();
            [
                [avg2(e[3], e[4]), avg3(e[3], e[4], e[5]), avg3(e[4], e[5], e[6]), avg3(e[5], e[6], e[7])],
                [avg2(e[2], e[3]), avg3(e[2], e[3], e[4]), avg2(e[3], e[4]), avg3(e[3], e[4], e[5])],
                [avg2(e[1], e[2]), avg3(e[1], e[2], e[3]), avg2(e[2], e[3]), avg3(e[2], e[3], e[4])],
                [avg2(e[0], e[1]), avg3(e[0], e[1], e[2]), avg2(e[1], e[2]), avg3(e[1], e[2], e[3])],
            ]
        }
        IntraMode::HU => [
            [avg2(l[0], l[1]), avg3(l[0], l[1], l[2]), avg2(l[1], l[2]), avg3(l[1], l[2], l[3])],
            [avg2(l[1], l[2]), avg3(l[1], l[2], l[3]), avg2(l[2], l[3]), avg3(l[2], l[3], l[3])],
            [avg2(l[2], l[3]), avg3(l[2], l[3], l[3]), l[3], l[3]],
            [l[3]; 4],
        ],
    }
}

/// Predicts the 4x4 subblock whose top-left pixel sits at `(x0, y0)` in `ws`.
/// The row above must extend four pixels past the block.
pub(crate) fn predict_subblock(ws: &mut [u8], x0: usize, y0: usize, stride: usize, mode: IntraMode) {
    let pixels = subblock_pixels(&Edges::gather(ws, x0, y0, stride), mode);
    for (r, row) in pixels.iter().enumerate() {
        ws[(y0 + r) * stride + x0..][..4].copy_from_slice(row);
    }
}

/// Adds an inverse-transformed residual to the 4x4 block at `(x0, y0)`.
pub(crate) fn add_residue(ws: &mut [u8], residue: &[i32; 16], x0: usize, y0: usize, stride: usize) {
    for (r, row) in residue.chunks_exact(4).enumerate() {
        let out = &mut ws[(y0 + r) * stride + x0..][..4];
        for (p, &d) in out.iter_mut().zip(row) {
            *p = clamp255(i32::from(*p) + d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg2() {
        for i in 0u8..=255 {
            for j in 0u8..=255 {
                let expected = ((f32::from(i) + f32::from(j)) / 2.0).ceil() as u8;
                assert_eq!(expected, avg2(i, j), "avg2({i}, {j})");
            }
        }
    }

    #[test]
    fn test_avg3_samples() {
        for i in (0u8..=255).step_by(5) {
            for j in (0u8..=255).step_by(3) {
                for k in (0u8..=255).step_by(7) {
                    let expected = ((u32::from(i) + 2 * u32::from(j) + u32::from(k) + 2) / 4) as u8;
                    assert_eq!(expected, avg3(i, j, k));
                }
            }
        }
    }

    // 5x5 grid: corner at (0, 0), block at (1, 1). The above-right pixels
    // for the second half of the top row run off the grid, so use a wider one.
    fn grid(top: [u8; 8], left: [u8; 4], corner: u8) -> ([u8; 9 * 5], usize) {
        let stride = 9;
        let mut g = [0u8; 9 * 5];
        g[0] = corner;
        g[1..9].copy_from_slice(&top);
        for (i, &l) in left.iter().enumerate() {
            g[(i + 1) * stride] = l;
        }
        (g, stride)
    }

    fn block(g: &[u8], stride: usize) -> [[u8; 4]; 4] {
        core::array::from_fn(|r| core::array::from_fn(|c| g[(r + 1) * stride + 1 + c]))
    }

    #[test]
    fn test_predict_he() {
        let (mut g, stride) = grid([0; 8], [4, 3, 2, 1], 5);
        predict_subblock(&mut g, 1, 1, stride, IntraMode::HE);
        assert_eq!(block(&g, stride), [[4; 4], [3; 4], [2; 4], [1; 4]]);
    }

    #[test]
    fn test_predict_rd() {
        let (mut g, stride) = grid([6, 7, 8, 9, 0, 0, 0, 0], [4, 3, 2, 1], 5);
        predict_subblock(&mut g, 1, 1, stride, IntraMode::RD);
        assert_eq!(
            block(&g, stride),
            [[5, 6, 7, 8], [4, 5, 6, 7], [3, 4, 5, 6], [2, 3, 4, 5]]
        );
    }

    #[test]
    fn test_predict_ld() {
        let (mut g, stride) = grid([1, 2, 3, 4, 5, 6, 7, 8], [0; 4], 0);
        predict_subblock(&mut g, 1, 1, stride, IntraMode::LD);
        assert_eq!(
            block(&g, stride),
            [[2, 3, 4, 5], [3, 4, 5, 6], [4, 5, 6, 7], [5, 6, 7, 8]]
        );
    }

    #[test]
    fn test_predict_ve() {
        let (mut g, stride) = grid([2, 3, 4, 5, 6, 0, 0, 0], [0; 4], 1);
        predict_subblock(&mut g, 1, 1, stride, IntraMode::VE);
        assert_eq!(block(&g, stride), [[2, 3, 4, 5]; 4]);
    }

    #[test]
    fn test_predict_hu_tail_is_last_left() {
        let (mut g, stride) = grid([0; 8], [10, 20, 30, 40], 0);
        predict_subblock(&mut g, 1, 1, stride, IntraMode::HU);
        let b = block(&g, stride);
        assert_eq!(b[3], [40; 4]);
        assert_eq!(b[2][2..], [40, 40]);
        assert_eq!(b[0][0], 15);
    }

    #[test]
    fn test_subblock_dc_rounds() {
        let (mut g, stride) = grid([1, 1, 1, 1, 0, 0, 0, 0], [2, 2, 2, 2], 0);
        predict_subblock(&mut g, 1, 1, stride, IntraMode::DC);
        assert_eq!(block(&g, stride), [[2; 4]; 4]);
    }

    #[test]
    fn test_add_residue() {
        let mut pblock = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let rblock = [
            -1, -2, -3, -4, 250, 249, 248, 250, -10, -18, -192, -17, -3, 15, 18, 9,
        ];
        let expected: [u8; 16] = [0, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0, 10, 29, 33, 25];

        add_residue(&mut pblock, &rblock, 0, 0, 4);

        assert_eq!(expected, pblock);
    }

    #[test]
    fn test_first_macroblock_dc_is_128() {
        let top = [0u8; 16];
        let left = [0u8; 17];
        let mut ws = luma_workspace(0, 0, 1, &top, &left);
        predict_luma(&mut ws, LumaMode::DC, 0, 0);
        for y in 1..=16 {
            assert!(ws[y * LUMA_STRIDE + 1..][..16].iter().all(|&p| p == 128));
        }
    }

    #[test]
    fn test_workspace_borders() {
        let top: [u8; 32] = core::array::from_fn(|i| i as u8);
        let mut left = [7u8; 17];
        left[0] = 99;

        let ws = luma_workspace(0, 0, 2, &top, &left);
        assert!(ws[..21].iter().all(|&p| p == 127));
        assert_eq!(ws[LUMA_STRIDE], 129);

        let ws = luma_workspace(1, 1, 2, &top, &left);
        assert_eq!(ws[0], 99);
        assert_eq!(&ws[1..17], &top[16..32]);
        // Last column replicates the final above pixel to the right.
        assert_eq!(&ws[17..21], &[31; 4]);
        assert_eq!(&ws[4 * LUMA_STRIDE + 17..][..4], &[31; 4]);
        assert_eq!(ws[LUMA_STRIDE], 7);

        let ws = luma_workspace(0, 1, 2, &top, &left);
        assert_eq!(ws[0], 129);
        assert_eq!(&ws[17..21], &[16, 17, 18, 19]);
    }

    #[test]
    fn test_chroma_tm_uses_borders() {
        let mut top = [0u8; 16];
        top[8..].fill(100);
        let mut left = [90u8; 9];
        left[0] = 95;
        let mut ws = chroma_workspace(1, 1, &top, &left);
        predict_chroma(&mut ws, ChromaMode::TM, 1, 1);
        for y in 1..=8 {
            assert!(ws[y * CHROMA_STRIDE + 1..][..8].iter().all(|&p| p == 95));
        }
    }
}
