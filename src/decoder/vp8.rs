//! An implementation of the VP8 Video Codec
//!
//! This module decodes the VP8 keyframes carried by lossy WebP images, as
//! defined in RFC 6386. Inter frames are not supported.
//!
//! # Related Links
//! * [rfc-6386](http://tools.ietf.org/html/rfc6386) - The VP8 Data Format and Decoding Guide
//! * [VP8.pdf](http://static.googleusercontent.com/media/research.google.com/en//pubs/archive/37073.pdf) - An overview of of the VP8 format

#![allow(clippy::needless_range_loop)]

use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use byteorder_lite::{ByteOrder, LittleEndian};

use super::api::{DecodingError, UpsamplingMethod};
use super::arithmetic::ArithmeticDecoder;
use super::loop_filter;
use super::yuv;
use crate::common::prediction::*;
use crate::common::transform;
use crate::common::types::*;
use crate::slice_reader::SliceReader;

/// Start code following the frame tag of every keyframe.
pub(crate) const VP8_MAGIC: [u8; 3] = [0x9d, 0x01, 0x2a];

#[derive(Default, Clone, Copy)]
struct MacroBlock {
    bpred: [IntraMode; 16],
    luma_mode: LumaMode,
    chroma_mode: ChromaMode,
    segmentid: u8,
    coeffs_skipped: bool,
    non_zero_dct: bool,
}

/// Info required from a previously decoded macro block in future
/// For the top macroblocks this will be the bottom values, for the left macroblock the right values
#[derive(Default, Clone, Copy)]
struct PreviousMacroBlock {
    bpred: [IntraMode; 4],
    // complexity is laid out like: y2,y,y,y,y,u,u,v,v
    complexity: [u8; 9],
}

#[derive(Default, Clone, Copy)]
struct Segment {
    ydc: i16,
    yac: i16,

    y2dc: i16,
    y2ac: i16,

    uvdc: i16,
    uvac: i16,

    delta_values: bool,

    quantizer_level: i8,
    loopfilter_level: i8,
}

/// Token probability plane, selected by block type.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Plane {
    /// Luma blocks whose DC comes from the Y2 block.
    YCoeff1 = 0,
    Y2 = 1,
    Chroma = 2,
    /// Luma blocks of B_PRED macroblocks, DC included.
    YCoeff0 = 3,
}

/// A decoded keyframe: Y, U and V planes padded to whole macroblocks.
#[derive(Default, Debug, Clone)]
pub(crate) struct Frame {
    /// The width of the luma plane
    pub(crate) width: u16,

    /// The height of the luma plane
    pub(crate) height: u16,

    pub(crate) ybuf: Vec<u8>,
    pub(crate) ubuf: Vec<u8>,
    pub(crate) vbuf: Vec<u8>,

    // Section 9.6
    /// Simple filter when set, normal filter otherwise.
    pub(crate) filter_type: bool,
    pub(crate) filter_level: u8,
    pub(crate) sharpness_level: u8,
}

impl Frame {
    pub(crate) fn luma_stride(&self) -> usize {
        usize::from(self.width.div_ceil(16)) * 16
    }

    pub(crate) fn chroma_stride(&self) -> usize {
        self.luma_stride() / 2
    }

    /// Fills an rgb buffer from the YUV buffers
    pub(crate) fn fill_rgb(&self, buf: &mut [u8], upsampling_method: UpsamplingMethod) {
        self.fill::<3>(buf, upsampling_method);
    }

    /// Fills an rgba buffer from the YUV buffers, with opaque alpha
    pub(crate) fn fill_rgba(&self, buf: &mut [u8], upsampling_method: UpsamplingMethod) {
        self.fill::<4>(buf, upsampling_method);
    }

    fn fill<const BPP: usize>(&self, buf: &mut [u8], upsampling_method: UpsamplingMethod) {
        let fill = match upsampling_method {
            UpsamplingMethod::Bilinear => yuv::fill_rgb_buffer_fancy::<BPP>,
            UpsamplingMethod::Simple => yuv::fill_rgb_buffer_simple::<BPP>,
        };
        fill(
            buf,
            &self.ybuf,
            &self.ubuf,
            &self.vbuf,
            usize::from(self.width),
            usize::from(self.height),
            self.luma_stride(),
            self.chroma_stride(),
        );
    }

    /// Copies the visible part of the planes into `buf` as Y, then U, then V,
    /// each tightly packed. Chroma planes are `ceil(w/2) x ceil(h/2)`.
    pub(crate) fn fill_yuv420(&self, buf: &mut [u8]) {
        let width = usize::from(self.width);
        let height = usize::from(self.height);
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        let (y_out, rest) = buf.split_at_mut(width * height);
        let (u_out, v_out) = rest.split_at_mut(chroma_width * chroma_height);

        copy_plane(y_out, &self.ybuf, width, self.luma_stride());
        copy_plane(u_out, &self.ubuf, chroma_width, self.chroma_stride());
        copy_plane(v_out, &self.vbuf, chroma_width, self.chroma_stride());
    }
}

fn copy_plane(out: &mut [u8], plane: &[u8], width: usize, stride: usize) {
    for (dst, src) in out.chunks_exact_mut(width).zip(plane.chunks(stride)) {
        dst.copy_from_slice(&src[..width]);
    }
}

/// Reads the extra magnitude of a token above `THREE` (section 13.2).
fn read_large_value(reader: &mut ArithmeticDecoder<'_>, p: &[Prob; NUM_DCT_TOKENS - 1]) -> i32 {
    if !reader.read_bool(p[3]) {
        if !reader.read_bool(p[4]) {
            2
        } else {
            3 + i32::from(reader.read_bool(p[5]))
        }
    } else {
        let category = if !reader.read_bool(p[6]) {
            usize::from(reader.read_bool(p[7]))
        } else {
            let bit1 = reader.read_bool(p[8]);
            let bit0 = reader.read_bool(p[9 + usize::from(bit1)]);
            2 + 2 * usize::from(bit1) + usize::from(bit0)
        };

        let extra = PROB_DCT_CAT[category]
            .iter()
            .take_while(|&&prob| prob != 0)
            .fold(0, |acc, &prob| (acc << 1) | i32::from(reader.read_bool(prob)));

        i32::from(DCT_CAT_BASE[category]) + extra
    }
}

/// Decodes the tokens of one 4x4 block into dequantized coefficients in
/// natural order, starting at zigzag position `first`.
///
/// Returns the position after the last token read. A result greater than
/// `first` means the block has coded coefficients.
fn read_coefficients(
    reader: &mut ArithmeticDecoder<'_>,
    output: &mut [i32; 16],
    probs: &[[[Prob; NUM_DCT_TOKENS - 1]; 3]; 8],
    first: usize,
    complexity: usize,
    dcq: i16,
    acq: i16,
) -> usize {
    let mut n = first;
    let mut p = &probs[usize::from(COEFF_BANDS[n])][complexity];

    while n < 16 {
        // end of block
        if !reader.read_bool(p[0]) {
            return n;
        }

        // a zero is never followed by end of block
        while !reader.read_bool(p[1]) {
            n += 1;
            if n == 16 {
                return 16;
            }
            p = &probs[usize::from(COEFF_BANDS[n])][0];
        }

        let (value, next_ctx) = if !reader.read_bool(p[2]) {
            (1, 1)
        } else {
            (read_large_value(reader, p), 2)
        };
        let value = if reader.read_flag() { -value } else { value };
        let q = if n > 0 { acq } else { dcq };
        output[usize::from(ZIGZAG[n])] = value * i32::from(q);

        n += 1;
        if n < 16 {
            p = &probs[usize::from(COEFF_BANDS[n])][next_ctx];
        }
    }

    16
}

/// Inverse transforms a dequantized block in place. Returns false when the
/// block is empty and there is nothing to add.
fn inverse_transform(block: &mut [i32; 16]) -> bool {
    if block[1..].iter().all(|&c| c == 0) {
        if block[0] == 0 {
            return false;
        }
        transform::idct4x4_dc(block);
    } else {
        transform::idct4x4(block);
    }
    true
}

/// Adds the residue of `block` to the subblock at `(x0, y0)` and clears it.
fn apply_residue(ws: &mut [u8], block: &mut [i32; 16], x0: usize, y0: usize, stride: usize) {
    if inverse_transform(block) {
        add_residue(ws, block, x0, y0, stride);
    }
    *block = [0; 16];
}

/// VP8 Decoder
///
/// Only decodes keyframes
pub(crate) struct Vp8Decoder<'a> {
    r: SliceReader<'a>,
    b: ArithmeticDecoder<'a>,

    mbwidth: u16,
    mbheight: u16,
    macroblocks: Vec<MacroBlock>,

    frame: Frame,

    segments_enabled: bool,
    segments_update_map: bool,
    segment: [Segment; MAX_SEGMENTS],

    loop_filter_adjustments_enabled: bool,
    ref_delta: [i32; 4],
    mode_delta: [i32; 4],

    partitions: Vec<ArithmeticDecoder<'a>>,

    segment_probs: [Prob; 3],
    token_probs: Box<TokenProbTables>,

    // Section 9.11
    prob_skip_false: Option<Prob>,

    top: Vec<PreviousMacroBlock>,
    left: PreviousMacroBlock,

    // The unfiltered borders from the previous macroblocks, used for
    // prediction (section 12). The left border starts with the top left pixel.
    top_border_y: Vec<u8>,
    left_border_y: [u8; 17],

    top_border_u: Vec<u8>,
    left_border_u: [u8; 9],

    top_border_v: Vec<u8>,
    left_border_v: [u8; 9],

    // Dequantized coefficients of the current macroblock: 16 Y, 4 U, 4 V.
    // Kept zeroed between macroblocks.
    coeff_blocks: [[i32; 16]; 24],
}

impl<'a> Vp8Decoder<'a> {
    /// Create a new decoder.
    /// The data must be a raw vp8 bitstream
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            r: SliceReader::new(data),
            b: ArithmeticDecoder::new(&[]),

            mbwidth: 0,
            mbheight: 0,
            macroblocks: Vec::new(),

            frame: Frame::default(),

            segments_enabled: false,
            segments_update_map: false,
            segment: [Segment::default(); MAX_SEGMENTS],

            loop_filter_adjustments_enabled: false,
            ref_delta: [0; 4],
            mode_delta: [0; 4],

            partitions: Vec::new(),

            segment_probs: [255; 3],
            token_probs: Box::new(COEFF_PROBS),

            prob_skip_false: None,

            top: Vec::new(),
            left: PreviousMacroBlock::default(),

            top_border_y: Vec::new(),
            left_border_y: [129; 17],

            top_border_u: Vec::new(),
            left_border_u: [129; 9],

            top_border_v: Vec::new(),
            left_border_v: [129; 9],

            coeff_blocks: [[0; 16]; 24],
        }
    }

    fn update_token_probabilities(&mut self) -> Result<(), DecodingError> {
        for (i, is) in COEFF_UPDATE_PROBS.iter().enumerate() {
            for (j, js) in is.iter().enumerate() {
                for (k, ks) in js.iter().enumerate() {
                    for (t, &prob) in ks.iter().enumerate() {
                        if self.b.read_bool(prob) {
                            self.token_probs[i][j][k][t] = self.b.read_literal(8);
                        }
                    }
                }
            }
        }
        self.b.check(())
    }

    fn init_partitions(&mut self, n: usize) -> Result<(), DecodingError> {
        let sizes = self
            .r
            .take_slice(3 * (n - 1))
            .map_err(|_| DecodingError::NotEnoughInitData)?;

        self.partitions = Vec::with_capacity(n);
        for size in sizes.chunks_exact(3) {
            let size = LittleEndian::read_u24(size) as usize;
            let data = self.r.take_slice(size)?;
            log::trace!("VP8 partition {}: {} bytes", self.partitions.len(), size);
            self.partitions.push(ArithmeticDecoder::new(data));
        }

        // The last partition takes the remainder.
        let data = self.r.take_slice(self.r.remaining())?;
        log::trace!("VP8 partition {}: {} bytes", self.partitions.len(), data.len());
        self.partitions.push(ArithmeticDecoder::new(data));

        Ok(())
    }

    fn read_quantization_indices(&mut self) -> Result<(), DecodingError> {
        fn dc_quant(index: i32) -> i16 {
            DC_QUANT[index.clamp(0, 127) as usize]
        }

        fn ac_quant(index: i32) -> i16 {
            AC_QUANT[index.clamp(0, 127) as usize]
        }

        let yac_abs = i32::from(self.b.read_literal(7));
        let ydc_delta = self.b.read_optional_signed_value(4);
        let y2dc_delta = self.b.read_optional_signed_value(4);
        let y2ac_delta = self.b.read_optional_signed_value(4);
        let uvdc_delta = self.b.read_optional_signed_value(4);
        let uvac_delta = self.b.read_optional_signed_value(4);

        let n = if self.segments_enabled {
            MAX_SEGMENTS
        } else {
            1
        };
        for segment in &mut self.segment[..n] {
            let base = if !self.segments_enabled {
                yac_abs
            } else if segment.delta_values {
                i32::from(segment.quantizer_level) + yac_abs
            } else {
                i32::from(segment.quantizer_level)
            };

            segment.ydc = dc_quant(base + ydc_delta);
            segment.yac = ac_quant(base);

            segment.y2dc = dc_quant(base + y2dc_delta) * 2;
            // The intermediate result (max`284*155`) can be larger than the `i16` range.
            segment.y2ac = ((i32::from(ac_quant(base + y2ac_delta)) * 155 / 100) as i16).max(8);

            segment.uvdc = dc_quant(base + uvdc_delta).min(132);
            segment.uvac = ac_quant(base + uvac_delta);
        }

        self.b.check(())
    }

    fn read_loop_filter_adjustments(&mut self) -> Result<(), DecodingError> {
        if self.b.read_flag() {
            for delta in &mut self.ref_delta {
                *delta = self.b.read_optional_signed_value(6);
            }
            for delta in &mut self.mode_delta {
                *delta = self.b.read_optional_signed_value(6);
            }
        }

        self.b.check(())
    }

    fn read_segment_updates(&mut self) -> Result<(), DecodingError> {
        // Section 9.3
        self.segments_update_map = self.b.read_flag();
        let update_segment_feature_data = self.b.read_flag();

        if update_segment_feature_data {
            let absolute_values = self.b.read_flag();

            for segment in &mut self.segment {
                segment.delta_values = !absolute_values;
            }
            for segment in &mut self.segment {
                segment.quantizer_level = self.b.read_optional_signed_value(7) as i8;
            }
            for segment in &mut self.segment {
                segment.loopfilter_level = self.b.read_optional_signed_value(6) as i8;
            }
        }

        if self.segments_update_map {
            for prob in &mut self.segment_probs {
                *prob = if self.b.read_flag() {
                    self.b.read_literal(8)
                } else {
                    255
                };
            }
        }

        self.b.check(())
    }

    fn read_frame_header(&mut self) -> Result<(), DecodingError> {
        let tag = self.r.read_u24_le()?;

        if tag & 1 != 0 {
            return Err(DecodingError::UnsupportedFeature(
                "non-keyframe VP8 frames".into(),
            ));
        }

        let version = (tag >> 1) & 7;
        if version > 3 {
            return Err(DecodingError::UnsupportedFeature(format!(
                "VP8 version {version}"
            )));
        }

        if (tag >> 4) & 1 == 0 {
            return Err(DecodingError::UnsupportedFeature(
                "VP8 frames not meant for display".into(),
            ));
        }

        let first_partition_size = (tag >> 5) as usize;

        let mut magic = [0u8; 3];
        self.r.read_exact(&mut magic)?;
        if magic != VP8_MAGIC {
            return Err(DecodingError::Vp8MagicInvalid(magic));
        }

        // The top two bits are an upscaling hint, which decoders ignore.
        let w = self.r.read_u16_le()?;
        let h = self.r.read_u16_le()?;

        self.frame.width = w & 0x3FFF;
        self.frame.height = h & 0x3FFF;
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(DecodingError::InconsistentImageSizes);
        }

        self.mbwidth = self.frame.width.div_ceil(16);
        self.mbheight = self.frame.height.div_ceil(16);
        let mbwidth = usize::from(self.mbwidth);
        let mbheight = usize::from(self.mbheight);

        log::debug!(
            "VP8 keyframe {}x{} ({}x{} macroblocks), first partition {} bytes",
            self.frame.width,
            self.frame.height,
            mbwidth,
            mbheight,
            first_partition_size
        );

        if first_partition_size == 0 || first_partition_size > self.r.remaining() {
            return Err(DecodingError::NotEnoughInitData);
        }
        self.b = ArithmeticDecoder::new(self.r.take_slice(first_partition_size)?);

        // defaults are intra mode DC and complexity 0
        self.top = vec![PreviousMacroBlock::default(); mbwidth];
        self.left = PreviousMacroBlock::default();
        self.macroblocks = Vec::with_capacity(mbwidth * mbheight);

        self.frame.ybuf = vec![0u8; mbwidth * 16 * mbheight * 16];
        self.frame.ubuf = vec![0u8; mbwidth * 8 * mbheight * 8];
        self.frame.vbuf = vec![0u8; mbwidth * 8 * mbheight * 8];

        self.top_border_y = vec![127u8; mbwidth * 16];
        self.top_border_u = vec![127u8; mbwidth * 8];
        self.top_border_v = vec![127u8; mbwidth * 8];

        let color_space = self.b.read_literal(1);
        // Clamping is always applied.
        let _clamping_type = self.b.read_literal(1);

        if color_space != 0 {
            return Err(DecodingError::ColorSpaceInvalid(color_space));
        }

        self.segments_enabled = self.b.read_flag();
        if self.segments_enabled {
            self.read_segment_updates()?;
        }

        self.frame.filter_type = self.b.read_flag();
        self.frame.filter_level = self.b.read_literal(6);
        self.frame.sharpness_level = self.b.read_literal(3);

        self.loop_filter_adjustments_enabled = self.b.read_flag();
        if self.loop_filter_adjustments_enabled {
            self.read_loop_filter_adjustments()?;
        }

        let num_partitions = 1usize << self.b.read_literal(2);
        self.b.check(())?;

        log::debug!(
            "VP8 segments {}, {} filter level {} sharpness {}, {} partitions",
            self.segments_enabled,
            if self.frame.filter_type { "simple" } else { "normal" },
            self.frame.filter_level,
            self.frame.sharpness_level,
            num_partitions
        );

        self.init_partitions(num_partitions)?;

        self.read_quantization_indices()?;

        // Refresh entropy probs has no meaning for a single keyframe.
        let _ = self.b.read_literal(1);

        self.update_token_probabilities()?;

        let mb_no_skip_coeff = self.b.read_literal(1);
        self.prob_skip_false = if mb_no_skip_coeff == 1 {
            Some(self.b.read_literal(8))
        } else {
            None
        };
        self.b.check(())
    }

    fn read_macroblock_header(&mut self, mbx: usize) -> Result<MacroBlock, DecodingError> {
        let mut mb = MacroBlock::default();

        if self.segments_enabled && self.segments_update_map {
            mb.segmentid = self.b.read_tree(&SEGMENT_ID_TREE, &self.segment_probs) as u8;
        }

        mb.coeffs_skipped = match self.prob_skip_false {
            Some(prob) => self.b.read_bool(prob),
            None => false,
        };

        // intra prediction
        let luma = self.b.read_tree(&KEYFRAME_YMODE_TREE, &KEYFRAME_YMODE_PROBS);
        mb.luma_mode =
            LumaMode::from_i8(luma).ok_or(DecodingError::LumaPredictionModeInvalid(luma))?;

        match mb.luma_mode.into_intra() {
            // `LumaMode::B` - This is predicted individually
            None => {
                for y in 0usize..4 {
                    for x in 0usize..4 {
                        let top = self.top[mbx].bpred[x];
                        let left = self.left.bpred[y];
                        let intra = self.b.read_tree(
                            &KEYFRAME_BPRED_MODE_TREE,
                            &KEYFRAME_BPRED_MODE_PROBS[top as usize][left as usize],
                        );
                        let bmode = IntraMode::from_i8(intra)
                            .ok_or(DecodingError::IntraPredictionModeInvalid(intra))?;
                        mb.bpred[x + y * 4] = bmode;

                        self.top[mbx].bpred[x] = bmode;
                        self.left.bpred[y] = bmode;
                    }
                }
            }
            Some(mode) => {
                mb.bpred = [mode; 16];
                self.left.bpred = [mode; 4];
                self.top[mbx].bpred = [mode; 4];
            }
        }

        let chroma = self
            .b
            .read_tree(&KEYFRAME_UV_MODE_TREE, &KEYFRAME_UV_MODE_PROBS);
        mb.chroma_mode =
            ChromaMode::from_i8(chroma).ok_or(DecodingError::ChromaPredictionModeInvalid(chroma))?;

        self.b.check(mb)
    }

    fn read_residual_data(
        &mut self,
        mb: &mut MacroBlock,
        mbx: usize,
        p: usize,
    ) -> Result<(), DecodingError> {
        let segment = self.segment[usize::from(mb.segmentid)];
        let reader = &mut self.partitions[p];
        let probs = &*self.token_probs;
        let blocks = &mut self.coeff_blocks;
        let top = &mut self.top[mbx];
        let left = &mut self.left;

        let mut plane = if mb.luma_mode == LumaMode::B {
            Plane::YCoeff0
        } else {
            Plane::Y2
        };

        if plane == Plane::Y2 {
            let complexity = top.complexity[0] + left.complexity[0];
            let mut block = [0i32; 16];
            let n = read_coefficients(
                reader,
                &mut block,
                &probs[Plane::Y2 as usize],
                0,
                usize::from(complexity),
                segment.y2dc,
                segment.y2ac,
            );

            let nonzero = u8::from(n > 0);
            left.complexity[0] = nonzero;
            top.complexity[0] = nonzero;

            transform::iwht4x4(&mut block);
            for (dst, &dc) in blocks.iter_mut().zip(&block) {
                dst[0] = dc;
            }

            plane = Plane::YCoeff1;
        }

        let first = if plane == Plane::YCoeff1 { 1 } else { 0 };

        for y in 0usize..4 {
            let mut left_ctx = left.complexity[y + 1];
            for x in 0usize..4 {
                let block = &mut blocks[x + y * 4];
                let complexity = top.complexity[x + 1] + left_ctx;
                let n = read_coefficients(
                    reader,
                    block,
                    &probs[plane as usize],
                    first,
                    usize::from(complexity),
                    segment.ydc,
                    segment.yac,
                );

                if block[0] != 0 || n > first {
                    mb.non_zero_dct = true;
                }

                left_ctx = u8::from(n > first);
                top.complexity[x + 1] = left_ctx;
            }

            left.complexity[y + 1] = left_ctx;
        }

        for (j, base) in [(5usize, 16usize), (7, 20)] {
            for y in 0usize..2 {
                let mut left_ctx = left.complexity[y + j];
                for x in 0usize..2 {
                    let block = &mut blocks[base + x + y * 2];
                    let complexity = top.complexity[x + j] + left_ctx;
                    let n = read_coefficients(
                        reader,
                        block,
                        &probs[Plane::Chroma as usize],
                        0,
                        usize::from(complexity),
                        segment.uvdc,
                        segment.uvac,
                    );

                    if n > 0 {
                        mb.non_zero_dct = true;
                    }

                    left_ctx = u8::from(n > 0);
                    top.complexity[x + j] = left_ctx;
                }

                left.complexity[y + j] = left_ctx;
            }
        }

        reader.check(())
    }

    fn intra_predict_luma(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let stride = LUMA_STRIDE;
        let mbwidth = usize::from(self.mbwidth);
        let mut ws = luma_workspace(mbx, mby, mbwidth, &self.top_border_y, &self.left_border_y);

        if mb.luma_mode == LumaMode::B {
            for sby in 0usize..4 {
                for sbx in 0usize..4 {
                    let i = sbx + sby * 4;
                    let (x0, y0) = (1 + sbx * 4, 1 + sby * 4);
                    predict_subblock(&mut ws, x0, y0, stride, mb.bpred[i]);
                    apply_residue(&mut ws, &mut self.coeff_blocks[i], x0, y0, stride);
                }
            }
        } else {
            predict_luma(&mut ws, mb.luma_mode, mbx, mby);
            for (i, block) in self.coeff_blocks[..16].iter_mut().enumerate() {
                apply_residue(&mut ws, block, 1 + (i % 4) * 4, 1 + (i / 4) * 4, stride);
            }
        }

        // The next macroblock's corner is this one's above-right pixel.
        self.left_border_y[0] = ws[16];
        for (i, left) in self.left_border_y[1..].iter_mut().enumerate() {
            *left = ws[(i + 1) * stride + 16];
        }
        self.top_border_y[mbx * 16..][..16].copy_from_slice(&ws[16 * stride + 1..][..16]);

        let ystride = mbwidth * 16;
        for y in 0usize..16 {
            self.frame.ybuf[(mby * 16 + y) * ystride + mbx * 16..][..16]
                .copy_from_slice(&ws[(1 + y) * stride + 1..][..16]);
        }
    }

    fn intra_predict_chroma(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let stride = CHROMA_STRIDE;
        let mut uws = chroma_workspace(mbx, mby, &self.top_border_u, &self.left_border_u);
        let mut vws = chroma_workspace(mbx, mby, &self.top_border_v, &self.left_border_v);

        predict_chroma(&mut uws, mb.chroma_mode, mbx, mby);
        predict_chroma(&mut vws, mb.chroma_mode, mbx, mby);

        let (ublocks, vblocks) = self.coeff_blocks[16..].split_at_mut(4);
        for (i, (ublock, vblock)) in ublocks.iter_mut().zip(vblocks).enumerate() {
            let (x0, y0) = (1 + (i % 2) * 4, 1 + (i / 2) * 4);
            apply_residue(&mut uws, ublock, x0, y0, stride);
            apply_residue(&mut vws, vblock, x0, y0, stride);
        }

        set_chroma_border(&mut self.left_border_u, &mut self.top_border_u, &uws, mbx);
        set_chroma_border(&mut self.left_border_v, &mut self.top_border_v, &vws, mbx);

        let uvstride = usize::from(self.mbwidth) * 8;
        for y in 0usize..8 {
            let offset = (mby * 8 + y) * uvstride + mbx * 8;
            self.frame.ubuf[offset..][..8].copy_from_slice(&uws[(1 + y) * stride + 1..][..8]);
            self.frame.vbuf[offset..][..8].copy_from_slice(&vws[(1 + y) * stride + 1..][..8]);
        }
    }

    /// Returns `(filter_level, interior_limit, hev_threshold)`. A level of 0
    /// disables filtering for the macroblock.
    fn calculate_filter_parameters(&self, macroblock: &MacroBlock) -> (u8, u8, u8) {
        let segment = &self.segment[usize::from(macroblock.segmentid)];
        let mut filter_level = i32::from(self.frame.filter_level);

        // if frame level filter level is 0, we must skip loop filter
        if filter_level == 0 {
            return (0, 0, 0);
        }

        if self.segments_enabled {
            if segment.delta_values {
                filter_level += i32::from(segment.loopfilter_level);
            } else {
                filter_level = i32::from(segment.loopfilter_level);
            }
        }

        if self.loop_filter_adjustments_enabled {
            // Keyframe macroblocks are all intra coded.
            filter_level += self.ref_delta[0];
            if macroblock.luma_mode == LumaMode::B {
                filter_level += self.mode_delta[0];
            }
        }

        let filter_level = filter_level.clamp(0, 63) as u8;

        let mut interior_limit = filter_level;
        let sharpness = self.frame.sharpness_level;
        if sharpness > 0 {
            interior_limit >>= if sharpness > 4 { 2 } else { 1 };
            interior_limit = interior_limit.min(9 - sharpness);
        }
        let interior_limit = interior_limit.max(1);

        let hev_threshold = if filter_level >= 40 {
            2
        } else if filter_level >= 15 {
            1
        } else {
            0
        };

        (filter_level, interior_limit, hev_threshold)
    }

    /// Filters the macroblocks of row `mby`, in raster order.
    fn filter_row(&mut self, mby: usize) {
        let mbwidth = usize::from(self.mbwidth);
        for mbx in 0..mbwidth {
            let mb = self.macroblocks[mby * mbwidth + mbx];
            let (level, interior, hev) = self.calculate_filter_parameters(&mb);
            if level == 0 {
                continue;
            }

            let mbedge_limit = (level + 2) * 2 + interior;
            let sub_edge_limit = level * 2 + interior;
            let filter_inner = mb.luma_mode == LumaMode::B || mb.non_zero_dct;

            let stride = mbwidth * 16;
            let origin = mby * 16 * stride + mbx * 16;
            let ybuf = &mut self.frame.ybuf;

            if self.frame.filter_type {
                // The simple filter leaves chroma alone.
                let filter = |buf: &mut [u8], pos: usize, step: usize, edge: bool| {
                    let limit = if edge { mbedge_limit } else { sub_edge_limit };
                    loop_filter::simple_segment(limit, buf, pos, step);
                };
                filter_edges(ybuf, origin, stride, 16, mbx > 0, mby > 0, filter_inner, filter);
            } else {
                let filter = |buf: &mut [u8], pos: usize, step: usize, edge: bool| {
                    if edge {
                        loop_filter::macroblock_filter(hev, interior, mbedge_limit, buf, pos, step);
                    } else {
                        loop_filter::subblock_filter(hev, interior, sub_edge_limit, buf, pos, step);
                    }
                };
                filter_edges(ybuf, origin, stride, 16, mbx > 0, mby > 0, filter_inner, filter);

                let stride = mbwidth * 8;
                let origin = mby * 8 * stride + mbx * 8;
                for plane in [&mut self.frame.ubuf, &mut self.frame.vbuf] {
                    filter_edges(plane, origin, stride, 8, mbx > 0, mby > 0, filter_inner, filter);
                }
            }
        }
    }

    /// Decodes the frame
    pub(crate) fn decode_frame(data: &'a [u8]) -> Result<Frame, DecodingError> {
        let mut decoder = Self::new(data);
        decoder.decode_frame_()?;
        Ok(decoder.frame)
    }

    fn decode_frame_(&mut self) -> Result<(), DecodingError> {
        self.read_frame_header()?;

        for mby in 0..usize::from(self.mbheight) {
            let p = mby % self.partitions.len();
            self.left = PreviousMacroBlock::default();

            for mbx in 0..usize::from(self.mbwidth) {
                let mut mb = self.read_macroblock_header(mbx)?;

                if !mb.coeffs_skipped {
                    self.read_residual_data(&mut mb, mbx, p)?;
                } else {
                    if mb.luma_mode != LumaMode::B {
                        self.left.complexity[0] = 0;
                        self.top[mbx].complexity[0] = 0;
                    }

                    for i in 1usize..9 {
                        self.left.complexity[i] = 0;
                        self.top[mbx].complexity[i] = 0;
                    }
                }

                self.intra_predict_luma(mbx, mby, &mb);
                self.intra_predict_chroma(mbx, mby, &mb);

                self.macroblocks.push(mb);
            }

            // Prediction of the next row uses the unfiltered borders saved above.
            self.filter_row(mby);

            self.left_border_y = [129u8; 17];
            self.left_border_u = [129u8; 9];
            self.left_border_v = [129u8; 9];
        }

        Ok(())
    }
}

/// Runs `filter(buf, pos, step, is_macroblock_edge)` over every pixel line
/// crossing the edges of a `size`x`size` block at `origin`, in the order the
/// format requires: left edge, inner vertical edges, top edge, inner
/// horizontal edges.
#[allow(clippy::too_many_arguments)]
fn filter_edges<F>(
    buf: &mut [u8],
    origin: usize,
    stride: usize,
    size: usize,
    left_edge: bool,
    top_edge: bool,
    inner: bool,
    mut filter: F,
) where
    F: FnMut(&mut [u8], usize, usize, bool),
{
    if left_edge {
        for y in 0..size {
            filter(buf, origin + y * stride, 1, true);
        }
    }
    if inner {
        for x in (4..size).step_by(4) {
            for y in 0..size {
                filter(buf, origin + y * stride + x, 1, false);
            }
        }
    }
    if top_edge {
        for x in 0..size {
            filter(buf, origin + x, stride, true);
        }
    }
    if inner {
        for y in (4..size).step_by(4) {
            for x in 0..size {
                filter(buf, origin + y * stride + x, stride, false);
            }
        }
    }
}

fn set_chroma_border(
    left_border: &mut [u8; 9],
    top_border: &mut [u8],
    chroma_block: &[u8; CHROMA_BLOCK_SIZE],
    mbx: usize,
) {
    let stride = CHROMA_STRIDE;
    // top left is top right of previous chroma block
    left_border[0] = chroma_block[8];

    for (i, left) in left_border[1..].iter_mut().enumerate() {
        *left = chroma_block[(i + 1) * stride + 8];
    }

    top_border[mbx * 8..][..8].copy_from_slice(&chroma_block[8 * stride + 1..][..8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::arithmetic::tests::BoolEncoder;

    struct HeaderOptions {
        width: u16,
        height: u16,
        filter_level: u8,
        yac: u8,
        skip_prob: Option<u8>,
    }

    /// Writes the first partition header up to and including the skip
    /// probability, with no segmentation and default token probabilities.
    fn write_header(enc: &mut BoolEncoder, opts: &HeaderOptions) {
        enc.write_literal(1, 0); // color space
        enc.write_literal(1, 0); // clamping
        enc.write_bool(128, false); // segmentation
        enc.write_bool(128, false); // normal filter
        enc.write_literal(6, u32::from(opts.filter_level));
        enc.write_literal(3, 0); // sharpness
        enc.write_bool(128, false); // filter deltas
        enc.write_literal(2, 0); // one partition
        enc.write_literal(7, u32::from(opts.yac));
        for _ in 0..5 {
            enc.write_bool(128, false);
        }
        enc.write_literal(1, 0); // refresh entropy probs
        for &prob in COEFF_UPDATE_PROBS.iter().flatten().flatten().flatten() {
            enc.write_bool(prob, false);
        }
        match opts.skip_prob {
            Some(prob) => {
                enc.write_literal(1, 1);
                enc.write_literal(8, u32::from(prob));
            }
            None => enc.write_literal(1, 0),
        }
    }

    /// DC_PRED luma and chroma.
    fn write_dc_modes(enc: &mut BoolEncoder) {
        enc.write_bool(KEYFRAME_YMODE_PROBS[0], true);
        enc.write_bool(KEYFRAME_YMODE_PROBS[1], false);
        enc.write_bool(KEYFRAME_YMODE_PROBS[2], false);
        enc.write_bool(KEYFRAME_UV_MODE_PROBS[0], false);
    }

    fn assemble(opts: &HeaderOptions, first: &[u8], tokens: &[u8]) -> Vec<u8> {
        let size = first.len() as u32;
        // keyframe, version 0, shown
        let tag = (size << 5) | (1 << 4);
        let mut data = tag.to_le_bytes()[..3].to_vec();
        data.extend_from_slice(&VP8_MAGIC);
        data.extend_from_slice(&opts.width.to_le_bytes());
        data.extend_from_slice(&opts.height.to_le_bytes());
        data.extend_from_slice(first);
        data.extend_from_slice(tokens);
        data
    }

    fn skipped_frame(opts: &HeaderOptions) -> Vec<u8> {
        let mut enc = BoolEncoder::new();
        write_header(&mut enc, opts);
        let mbs = usize::from(opts.width.div_ceil(16)) * usize::from(opts.height.div_ceil(16));
        for _ in 0..mbs {
            enc.write_bool(opts.skip_prob.unwrap_or(128), true);
            write_dc_modes(&mut enc);
        }
        let first = enc.finish();
        let tokens = BoolEncoder::new().finish();
        assemble(opts, &first, &tokens)
    }

    #[test]
    fn skipped_macroblocks_predict_flat_grey() {
        let opts = HeaderOptions {
            width: 20,
            height: 20,
            filter_level: 20,
            yac: 10,
            skip_prob: Some(200),
        };
        let frame = Vp8Decoder::decode_frame(&skipped_frame(&opts)).unwrap();
        assert_eq!((frame.width, frame.height), (20, 20));
        assert_eq!(frame.ybuf.len(), 32 * 32);
        assert!(frame.ybuf.iter().all(|&p| p == 128));
        assert!(frame.ubuf.iter().all(|&p| p == 128));
        assert!(frame.vbuf.iter().all(|&p| p == 128));

        let mut yuv = vec![0u8; 20 * 20 + 2 * 10 * 10];
        frame.fill_yuv420(&mut yuv);
        assert!(yuv.iter().all(|&p| p == 128));
    }

    #[test]
    fn y2_dc_coefficient_lifts_luma() {
        let opts = HeaderOptions {
            width: 16,
            height: 16,
            filter_level: 0,
            yac: 127,
            skip_prob: None,
        };
        let mut enc = BoolEncoder::new();
        write_header(&mut enc, &opts);
        write_dc_modes(&mut enc);
        let first = enc.finish();

        let mut tokens = BoolEncoder::new();
        let y2 = &COEFF_PROBS[Plane::Y2 as usize];
        // DC token ONE, positive, then end of block.
        tokens.write_bool(y2[0][0][0], true);
        tokens.write_bool(y2[0][0][1], true);
        tokens.write_bool(y2[0][0][2], false);
        tokens.write_bool(128, false);
        tokens.write_bool(y2[1][1][0], false);
        for _ in 0..16 {
            tokens.write_bool(COEFF_PROBS[Plane::YCoeff1 as usize][1][0][0], false);
        }
        for _ in 0..8 {
            tokens.write_bool(COEFF_PROBS[Plane::Chroma as usize][0][0][0], false);
        }
        let tokens = tokens.finish();

        let frame = Vp8Decoder::decode_frame(&assemble(&opts, &first, &tokens)).unwrap();
        // 2 * 157 dequantized, (314 + 3) >> 3 = 39 after the WHT, (39 + 4) >> 3 = 5.
        assert!(frame.ybuf.iter().all(|&p| p == 133));
        assert!(frame.ubuf.iter().all(|&p| p == 128));
        assert!(frame.vbuf.iter().all(|&p| p == 128));
    }

    #[test]
    fn exhausted_token_partition_is_an_error() {
        let opts = HeaderOptions {
            width: 64,
            height: 64,
            filter_level: 0,
            yac: 40,
            skip_prob: None,
        };
        let mut enc = BoolEncoder::new();
        write_header(&mut enc, &opts);
        for _ in 0..16 {
            write_dc_modes(&mut enc);
        }
        let first = enc.finish();
        let data = assemble(&opts, &first, &[0]);
        assert!(matches!(
            Vp8Decoder::decode_frame(&data),
            Err(DecodingError::BitStreamError)
        ));
    }

    #[test]
    fn header_rejections() {
        let opts = HeaderOptions {
            width: 16,
            height: 16,
            filter_level: 0,
            yac: 0,
            skip_prob: Some(1),
        };
        let good = skipped_frame(&opts);
        assert!(Vp8Decoder::decode_frame(&good).is_ok());

        let mut bad_magic = good.clone();
        bad_magic[4] = 0x02;
        assert!(matches!(
            Vp8Decoder::decode_frame(&bad_magic),
            Err(DecodingError::Vp8MagicInvalid([0x9d, 0x02, 0x2a]))
        ));

        let mut interframe = good.clone();
        interframe[0] |= 1;
        assert!(matches!(
            Vp8Decoder::decode_frame(&interframe),
            Err(DecodingError::UnsupportedFeature(_))
        ));

        let mut hidden = good.clone();
        hidden[0] &= !(1 << 4);
        assert!(matches!(
            Vp8Decoder::decode_frame(&hidden),
            Err(DecodingError::UnsupportedFeature(_))
        ));

        // First partition claims more bytes than the frame holds.
        let mut oversized = good.clone();
        oversized[2] = 0xff;
        assert!(matches!(
            Vp8Decoder::decode_frame(&oversized),
            Err(DecodingError::NotEnoughInitData)
        ));

        let mut enc = BoolEncoder::new();
        enc.write_literal(1, 1);
        let colorspace = assemble(&opts, &enc.finish(), &[]);
        assert!(matches!(
            Vp8Decoder::decode_frame(&colorspace),
            Err(DecodingError::ColorSpaceInvalid(1))
        ));
    }

    #[test]
    fn filter_parameters() {
        let mut decoder = Vp8Decoder::new(&[]);
        decoder.frame.filter_level = 32;
        decoder.frame.sharpness_level = 5;
        let mb = MacroBlock::default();
        assert_eq!(decoder.calculate_filter_parameters(&mb), (32, 4, 1));

        decoder.frame.sharpness_level = 0;
        assert_eq!(decoder.calculate_filter_parameters(&mb), (32, 32, 1));

        decoder.frame.filter_level = 50;
        decoder.loop_filter_adjustments_enabled = true;
        decoder.ref_delta[0] = 20;
        decoder.mode_delta[0] = -63;
        assert_eq!(decoder.calculate_filter_parameters(&mb), (63, 63, 2));

        let bpred = MacroBlock {
            luma_mode: LumaMode::B,
            ..MacroBlock::default()
        };
        assert_eq!(decoder.calculate_filter_parameters(&bpred), (7, 7, 0));

        decoder.frame.filter_level = 0;
        assert_eq!(decoder.calculate_filter_parameters(&bpred), (0, 0, 0));
    }

    #[test]
    fn segment_levels_override_frame_level() {
        let mut decoder = Vp8Decoder::new(&[]);
        decoder.frame.filter_level = 10;
        decoder.segments_enabled = true;
        decoder.segment[1].loopfilter_level = 30;
        decoder.segment[2].loopfilter_level = -20;
        decoder.segment[2].delta_values = true;

        let in_segment = |id| MacroBlock {
            segmentid: id,
            ..MacroBlock::default()
        };
        assert_eq!(decoder.calculate_filter_parameters(&in_segment(1)).0, 30);
        assert_eq!(decoder.calculate_filter_parameters(&in_segment(2)).0, 0);
    }

    #[test]
    fn large_token_values() {
        // DCT_CAT3 with extra bits 101: 11 + 5 = 16.
        let p = COEFF_PROBS[0][1][0];
        let mut enc = BoolEncoder::new();
        enc.write_bool(p[3], true);
        enc.write_bool(p[6], true);
        enc.write_bool(p[8], false);
        enc.write_bool(p[9], false);
        for (&prob, bit) in PROB_DCT_CAT[2].iter().zip([true, false, true]) {
            enc.write_bool(prob, bit);
        }
        // DCT_CAT1 with extra bit 1: 6.
        enc.write_bool(p[3], true);
        enc.write_bool(p[6], false);
        enc.write_bool(p[7], false);
        enc.write_bool(PROB_DCT_CAT[0][0], true);
        // THREE / FOUR
        enc.write_bool(p[3], false);
        enc.write_bool(p[4], true);
        enc.write_bool(p[5], true);
        let data = enc.finish();

        let mut reader = ArithmeticDecoder::new(&data);
        assert_eq!(read_large_value(&mut reader, &p), 16);
        assert_eq!(read_large_value(&mut reader, &p), 6);
        assert_eq!(read_large_value(&mut reader, &p), 4);
    }
}
