//! Inverse DCT and Walsh-Hadamard transforms (RFC 6386 section 14).

/// `sqrt(2) * cos(pi/8) - 1` in Q16.
const COS_PI8_SQRT2_MINUS1: i64 = 20091;
/// `sqrt(2) * sin(pi/8)` in Q16.
const SIN_PI8_SQRT2: i64 = 35468;

/// DC-only inverse transform: every output sample is `(dc + 4) >> 3`.
#[inline]
pub(crate) fn idct4x4_dc(block: &mut [i32; 16]) {
    let dc = (block[0] + 4) >> 3;
    block.fill(dc);
}

/// One 1-D butterfly over `[s0, s1, s2, s3]`, returning `[a+d, b+c, b-c, a-d]`.
/// Products are taken in `i64`; `i32` can wrap on corrupt coefficients.
#[inline]
fn butterfly(s: [i64; 4]) -> [i64; 4] {
    let cos = |x: i64| x + ((x * COS_PI8_SQRT2_MINUS1) >> 16);
    let sin = |x: i64| (x * SIN_PI8_SQRT2) >> 16;
    let a = s[0] + s[2];
    let b = s[0] - s[2];
    let c = sin(s[1]) - cos(s[3]);
    let d = cos(s[1]) + sin(s[3]);
    [a + d, b + c, b - c, a - d]
}

/// Inverse DCT of a dequantized 4x4 block, in place. Vertical pass first.
pub(crate) fn idct4x4(block: &mut [i32; 16]) {
    for i in 0usize..4 {
        let column = [block[i], block[4 + i], block[8 + i], block[12 + i]].map(i64::from);
        for (k, v) in butterfly(column).into_iter().enumerate() {
            block[4 * k + i] = v as i32;
        }
    }

    for row in block.chunks_exact_mut(4) {
        let out = butterfly([row[0], row[1], row[2], row[3]].map(i64::from));
        for (dst, v) in row.iter_mut().zip(out) {
            *dst = ((v + 4) >> 3) as i32;
        }
    }
}

/// Inverse Walsh-Hadamard transform of the Y2 block (section 14.3).
/// Output `i` becomes the DC coefficient of luma subblock `i`.
pub(crate) fn iwht4x4(block: &mut [i32; 16]) {
    for i in 0usize..4 {
        let a1 = block[i] + block[12 + i];
        let b1 = block[4 + i] + block[8 + i];
        let c1 = block[4 + i] - block[8 + i];
        let d1 = block[i] - block[12 + i];

        block[i] = a1 + b1;
        block[4 + i] = c1 + d1;
        block[8 + i] = a1 - b1;
        block[12 + i] = d1 - c1;
    }

    for row in block.chunks_exact_mut(4) {
        let a1 = row[0] + row[3];
        let b1 = row[1] + row[2];
        let c1 = row[1] - row[2];
        let d1 = row[0] - row[3];

        row[0] = (a1 + b1 + 3) >> 3;
        row[1] = (c1 + d1 + 3) >> 3;
        row[2] = (a1 - b1 + 3) >> 3;
        row[3] = (d1 - c1 + 3) >> 3;
    }
}
