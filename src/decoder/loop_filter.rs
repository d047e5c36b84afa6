//! VP8 in-loop deblocking filters (RFC 6386 section 15).
//!
//! Every filter works on one line of pixels straddling an edge. The pixel
//! just past the edge sits at `buf[pos]`, and neighbours are `step` apart:
//! `q_k = buf[pos + k * step]` and `p_k = buf[pos - (k + 1) * step]`. Use
//! `step = 1` across a vertical edge and `step = stride` across a
//! horizontal one.

#[inline]
fn c(v: i32) -> i32 {
    v.clamp(-128, 127)
}

#[inline]
fn u2s(v: u8) -> i32 {
    i32::from(v) - 128
}

#[inline]
fn s2u(v: i32) -> u8 {
    (c(v) + 128) as u8
}

#[inline]
fn diff(a: u8, b: u8) -> u8 {
    a.abs_diff(b)
}

/// The eight pixels around the edge, `p3..p0` then `q0..q3`.
#[inline]
fn taps(buf: &[u8], pos: usize, step: usize) -> [u8; 8] {
    core::array::from_fn(|i| buf[pos + i * step - 4 * step])
}

/// Adjusts `p0`/`q0` and returns the filter value applied to `q0`.
#[inline]
fn common_adjust(use_outer_taps: bool, buf: &mut [u8], pos: usize, step: usize) -> i32 {
    let p1 = u2s(buf[pos - 2 * step]);
    let p0 = u2s(buf[pos - step]);
    let q0 = u2s(buf[pos]);
    let q1 = u2s(buf[pos + step]);

    let outer = if use_outer_taps { c(p1 - q1) } else { 0 };
    let a = c(outer + 3 * (q0 - p0));
    // Rounding differs between the two sides.
    let b = c(a + 3) >> 3;
    let a = c(a + 4) >> 3;

    buf[pos] = s2u(q0 - a);
    buf[pos - step] = s2u(p0 + b);

    a
}

#[inline]
fn simple_threshold(edge_limit: u8, p1: u8, p0: u8, q0: u8, q1: u8) -> bool {
    u16::from(diff(p0, q0)) * 2 + u16::from(diff(p1, q1) >> 1) <= u16::from(edge_limit)
}

#[inline]
fn should_filter(interior_limit: u8, edge_limit: u8, t: &[u8; 8]) -> bool {
    let [p3, p2, p1, p0, q0, q1, q2, q3] = *t;
    simple_threshold(edge_limit, p1, p0, q0, q1)
        && diff(p3, p2) <= interior_limit
        && diff(p2, p1) <= interior_limit
        && diff(p1, p0) <= interior_limit
        && diff(q3, q2) <= interior_limit
        && diff(q2, q1) <= interior_limit
        && diff(q1, q0) <= interior_limit
}

#[inline]
fn high_edge_variance(threshold: u8, t: &[u8; 8]) -> bool {
    diff(t[2], t[3]) > threshold || diff(t[5], t[4]) > threshold
}

/// The simple filter: only `p0` and `q0` change.
pub(crate) fn simple_segment(edge_limit: u8, buf: &mut [u8], pos: usize, step: usize) {
    let p1 = buf[pos - 2 * step];
    let p0 = buf[pos - step];
    let q0 = buf[pos];
    let q1 = buf[pos + step];
    if simple_threshold(edge_limit, p1, p0, q0, q1) {
        common_adjust(true, buf, pos, step);
    }
}

/// Normal filter for edges between subblocks inside a macroblock.
pub(crate) fn subblock_filter(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    buf: &mut [u8],
    pos: usize,
    step: usize,
) {
    let t = taps(buf, pos, step);
    if !should_filter(interior_limit, edge_limit, &t) {
        return;
    }

    let hev = high_edge_variance(hev_threshold, &t);
    let a = (common_adjust(hev, buf, pos, step) + 1) >> 1;
    if !hev {
        buf[pos + step] = s2u(u2s(t[5]) - a);
        buf[pos - 2 * step] = s2u(u2s(t[2]) + a);
    }
}

/// Normal filter for edges between macroblocks; reaches three pixels deep.
pub(crate) fn macroblock_filter(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    buf: &mut [u8],
    pos: usize,
    step: usize,
) {
    let t = taps(buf, pos, step);
    if !should_filter(interior_limit, edge_limit, &t) {
        return;
    }

    if high_edge_variance(hev_threshold, &t) {
        common_adjust(true, buf, pos, step);
        return;
    }

    let [_, p2, p1, p0, q0, q1, q2, _] = t.map(u2s);
    let w = c(c(p1 - q1) + 3 * (q0 - p0));

    let a = c((27 * w + 63) >> 7);
    buf[pos] = s2u(q0 - a);
    buf[pos - step] = s2u(p0 + a);

    let a = c((18 * w + 63) >> 7);
    buf[pos + step] = s2u(q1 - a);
    buf[pos - 2 * step] = s2u(p1 + a);

    let a = c((9 * w + 63) >> 7);
    buf[pos + 2 * step] = s2u(q2 - a);
    buf[pos - 3 * step] = s2u(p2 + a);
}
