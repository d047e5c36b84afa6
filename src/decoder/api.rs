use alloc::string::String;
use thiserror::Error;

/// Errors that can occur when attempting to decode a WebP image
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodingError {
    /// An IO error occurred while reading the file
    #[cfg(feature = "std")]
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    /// RIFF's "RIFF" signature not found or invalid
    #[error("Invalid RIFF signature: {0:x?}")]
    RiffSignatureInvalid([u8; 4]),

    /// WebP's "WEBP" signature not found or invalid
    #[error("Invalid WebP signature: {0:x?}")]
    WebpSignatureInvalid([u8; 4]),

    /// An expected chunk was missing
    #[error("An expected chunk was missing")]
    ChunkMissing,

    /// Chunk Header was incorrect or invalid in its usage
    #[error("Invalid Chunk header: {0:x?}")]
    ChunkHeaderInvalid([u8; 4]),

    /// A chunk that may appear once appeared twice
    #[error("Duplicate chunk: {0:x?}")]
    DuplicateChunk([u8; 4]),

    /// The file mixes chunks that cannot appear together
    #[error("Invalid combination of chunks")]
    InvalidChunkCombination,

    /// A chunk's declared size runs past the end of the file
    #[error("Invalid chunk size")]
    InvalidChunkSize,

    /// The ALPH chunk preprocessing info flag was invalid
    #[error("Alpha chunk preprocessing flag invalid")]
    InvalidAlphaPreprocessing,

    /// Invalid compression method
    #[error("Invalid compression method")]
    InvalidCompressionMethod,

    /// Alpha chunk doesn't match the frame's size
    #[error("Alpha chunk size mismatch")]
    AlphaChunkSizeMismatch,

    /// Image is too large, either for the platform's pointer size or generally
    #[error("Image too large")]
    ImageTooLarge,

    /// The canvas and the bitstream disagree on the image size
    #[error("Inconsistent image sizes")]
    InconsistentImageSizes,

    /// Signature of 0x2f not found
    #[error("Invalid lossless signature: {0:x?}")]
    LosslessSignatureInvalid(u8),

    /// Version Number was not zero
    #[error("Invalid lossless version number: {0}")]
    VersionNumberInvalid(u8),

    /// Invalid color cache bits
    #[error("Invalid color cache bits: {0}")]
    InvalidColorCacheBits(u8),

    /// An invalid Huffman code was encountered
    #[error("Invalid Huffman code")]
    HuffmanError,

    /// The bitstream was somehow corrupt
    #[error("Corrupt bitstream")]
    BitStreamError,

    /// The transforms specified were invalid
    #[error("Invalid transform")]
    TransformError,

    /// VP8's `[0x9D, 0x01, 0x2A]` magic not found or invalid
    #[error("Invalid VP8 magic: {0:x?}")]
    Vp8MagicInvalid([u8; 3]),

    /// VP8 Decoder initialisation wasn't provided with enough data
    #[error("Not enough VP8 init data")]
    NotEnoughInitData,

    /// At time of writing, only the YUV colour-space encoded as `0` is specified
    #[error("Invalid VP8 color space: {0}")]
    ColorSpaceInvalid(u8),

    /// LUMA prediction mode was not recognised
    #[error("Invalid VP8 luma prediction mode: {0}")]
    LumaPredictionModeInvalid(i8),

    /// Intra-prediction mode was not recognised
    #[error("Invalid VP8 intra prediction mode: {0}")]
    IntraPredictionModeInvalid(i8),

    /// Chroma prediction mode was not recognised
    #[error("Invalid VP8 chroma prediction mode: {0}")]
    ChromaPredictionModeInvalid(i8),

    /// The file may be valid, but this crate doesn't support decoding it.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Invalid function call or parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Memory limit exceeded
    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,
}

use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use hashbrown::HashMap;

use super::extended::{read_alpha_chunk, read_extended_header};
use super::limits::Limits;
use super::lossless::{LosslessDecoder, LosslessHeader};
use super::vp8::{Frame, Vp8Decoder, VP8_MAGIC};
use super::yuv;
use crate::slice_reader::SliceReader;

/// Largest width or height a VP8 or VP8L header can carry.
const MAX_SIMPLE_DIMENSION: u32 = 16383;

/// All possible RIFF chunks in a WebP image file
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq)]
pub(crate) enum WebPRiffChunk {
    RIFF,
    WEBP,
    VP8,
    VP8L,
    VP8X,
    ANIM,
    ANMF,
    ALPH,
    ICCP,
    EXIF,
    XMP,
    Unknown([u8; 4]),
}

impl WebPRiffChunk {
    pub(crate) const fn from_fourcc(chunk_fourcc: [u8; 4]) -> Self {
        match &chunk_fourcc {
            b"RIFF" => Self::RIFF,
            b"WEBP" => Self::WEBP,
            b"VP8 " => Self::VP8,
            b"VP8L" => Self::VP8L,
            b"VP8X" => Self::VP8X,
            b"ANIM" => Self::ANIM,
            b"ANMF" => Self::ANMF,
            b"ALPH" => Self::ALPH,
            b"ICCP" => Self::ICCP,
            b"EXIF" => Self::EXIF,
            b"XMP " => Self::XMP,
            _ => Self::Unknown(chunk_fourcc),
        }
    }

    pub(crate) const fn to_fourcc(self) -> [u8; 4] {
        match self {
            Self::RIFF => *b"RIFF",
            Self::WEBP => *b"WEBP",
            Self::VP8 => *b"VP8 ",
            Self::VP8L => *b"VP8L",
            Self::VP8X => *b"VP8X",
            Self::ANIM => *b"ANIM",
            Self::ANMF => *b"ANMF",
            Self::ALPH => *b"ALPH",
            Self::ICCP => *b"ICCP",
            Self::EXIF => *b"EXIF",
            Self::XMP => *b"XMP ",
            Self::Unknown(fourcc) => fourcc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    Lossy,
    Lossless,
}

/// Methods for upsampling the chroma values in lossy decoding
///
/// The chroma red and blue planes are encoded in VP8 as half the size of the luma plane
/// Therefore we need to upsample these values up to fit each pixel in the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpsamplingMethod {
    /// Simple upsampling, just uses the closest u/v value to the pixel when upsampling
    ///
    /// Matches the -nofancy option in dwebp.
    #[default]
    Simple,
    /// Fancy upsampling
    ///
    /// Does bilinear interpolation using the 4 values nearest to the pixel, weighting based on the distance
    /// from the pixel.
    Bilinear,
}

/// Layout of the pixels returned by [`read`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit red, green, blue, alpha, interleaved.
    Rgba,
    /// 8-bit red, green, blue, interleaved.
    Rgb,
    /// Planar 4:2:0: Y, then U, then V.
    Yuv,
    /// Planar 4:2:0 followed by a full-resolution alpha plane.
    Yuva,
}

impl PixelFormat {
    /// Bytes needed to hold a `width` x `height` image, or `None` on overflow.
    pub fn buffer_size(self, width: u32, height: u32) -> Option<usize> {
        let width = usize::try_from(width).ok()?;
        let height = usize::try_from(height).ok()?;
        let pixels = width.checked_mul(height)?;
        match self {
            Self::Rgba => pixels.checked_mul(4),
            Self::Rgb => pixels.checked_mul(3),
            Self::Yuv | Self::Yuva => {
                let chroma = width.div_ceil(2).checked_mul(height.div_ceil(2))?;
                let yuv = pixels.checked_add(chroma.checked_mul(2)?)?;
                if self == Self::Yuva {
                    yuv.checked_add(pixels)
                } else {
                    Some(yuv)
                }
            }
        }
    }
}

/// WebP decoder configuration. Reusable across requests.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeConfig {
    /// Upsampling method for lossy chroma reconstruction. Default: `Simple`.
    pub upsampling: UpsamplingMethod,
    /// Size and memory caps checked before decoding.
    pub limits: Limits,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            upsampling: UpsamplingMethod::Simple,
            limits: Limits::default(),
        }
    }
}

impl DecodeConfig {
    /// Set the upsampling method.
    #[must_use]
    pub fn upsampling(mut self, method: UpsamplingMethod) -> Self {
        self.upsampling = method;
        self
    }

    /// Replace the decode limits.
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

}

/// WebP image format decoder.
///
/// Parsing the container happens in [`WebPDecoder::new`]; no pixels are
/// decoded until [`WebPDecoder::read_image`] or [`WebPDecoder::decode`].
pub struct WebPDecoder<'a> {
    data: &'a [u8],
    config: DecodeConfig,

    width: u32,
    height: u32,

    kind: ImageKind,
    has_alpha: bool,

    chunks: HashMap<WebPRiffChunk, Range<usize>>,
}

impl<'a> WebPDecoder<'a> {
    /// Create a new `WebPDecoder` from the data slice.
    pub fn new(data: &'a [u8]) -> Result<Self, DecodingError> {
        Self::new_with_config(data, DecodeConfig::default())
    }

    /// Create a new `WebPDecoder` from the data slice with the given configuration.
    pub fn new_with_config(data: &'a [u8], config: DecodeConfig) -> Result<Self, DecodingError> {
        config.limits.check_file_size(data.len() as u64)?;

        let mut decoder = Self {
            data,
            config,
            width: 0,
            height: 0,
            kind: ImageKind::Lossy,
            has_alpha: false,
            chunks: HashMap::new(),
        };
        decoder.read_data()?;
        decoder
            .config
            .limits
            .check_dimensions(decoder.width, decoder.height)?;
        Ok(decoder)
    }

    fn read_data(&mut self) -> Result<(), DecodingError> {
        let mut r = SliceReader::new(self.data);

        match read_fourcc(&mut r)? {
            WebPRiffChunk::RIFF => {}
            fourcc => return Err(DecodingError::RiffSignatureInvalid(fourcc.to_fourcc())),
        }
        let riff_size = r.read_u32_le()? as usize;
        match read_fourcc(&mut r)? {
            WebPRiffChunk::WEBP => {}
            fourcc => return Err(DecodingError::WebpSignatureInvalid(fourcc.to_fourcc())),
        }
        if riff_size < 4 {
            return Err(DecodingError::InvalidChunkSize);
        }

        // Anything past the RIFF payload is not part of the image.
        let end = riff_size.saturating_add(8).min(self.data.len());
        self.data = &self.data[..end];
        let mut r = SliceReader::new(self.data);
        r.seek_from_start(12)?;

        let (chunk, range) = read_chunk(&mut r)?;
        match chunk {
            WebPRiffChunk::VP8 => {
                let (width, height) = read_vp8_header(&self.data[range.clone()])?;
                self.set_simple_dimensions(width, height)?;
                self.kind = ImageKind::Lossy;
                self.chunks.insert(chunk, range);
                reject_trailing_alpha(&mut r)?;
            }
            WebPRiffChunk::VP8L => {
                let header = read_vp8l_header(&self.data[range.clone()])?;
                self.set_simple_dimensions(header.width.into(), header.height.into())?;
                self.kind = ImageKind::Lossless;
                self.has_alpha = header.alpha_is_used;
                self.chunks.insert(chunk, range);
                reject_trailing_alpha(&mut r)?;
            }
            WebPRiffChunk::VP8X => self.read_extended(&mut r, range)?,
            _ => return Err(DecodingError::ChunkHeaderInvalid(chunk.to_fourcc())),
        }

        log::debug!(
            "WebP container: {}x{} {:?}, alpha {}, chunks {:?}",
            self.width,
            self.height,
            self.kind,
            self.has_alpha,
            self.chunks
        );

        Ok(())
    }

    fn set_simple_dimensions(&mut self, width: u32, height: u32) -> Result<(), DecodingError> {
        if width > MAX_SIMPLE_DIMENSION || height > MAX_SIMPLE_DIMENSION {
            return Err(DecodingError::ImageTooLarge);
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn read_extended(
        &mut self,
        r: &mut SliceReader<'a>,
        header_range: Range<usize>,
    ) -> Result<(), DecodingError> {
        if header_range.len() < 10 {
            return Err(DecodingError::InvalidChunkSize);
        }
        let info = read_extended_header(&mut SliceReader::new(&self.data[header_range.clone()]))?;
        if info.animation {
            return Err(DecodingError::UnsupportedFeature("animation".into()));
        }
        if u64::from(info.canvas_width) * u64::from(info.canvas_height) > u64::from(u32::MAX) {
            return Err(DecodingError::ImageTooLarge);
        }
        self.width = info.canvas_width;
        self.height = info.canvas_height;
        self.chunks.insert(WebPRiffChunk::VP8X, header_range);

        // A truncated trailing header ends the chunk list.
        while r.remaining() >= 8 {
            let (chunk, range) = read_chunk(r)?;
            match chunk {
                WebPRiffChunk::ANIM | WebPRiffChunk::ANMF => {
                    return Err(DecodingError::UnsupportedFeature("animation".into()));
                }
                WebPRiffChunk::VP8
                | WebPRiffChunk::VP8L
                | WebPRiffChunk::ALPH
                | WebPRiffChunk::VP8X => {
                    if self.chunks.contains_key(&chunk) {
                        return Err(DecodingError::DuplicateChunk(chunk.to_fourcc()));
                    }
                    self.chunks.insert(chunk, range);
                }
                WebPRiffChunk::ICCP | WebPRiffChunk::EXIF | WebPRiffChunk::XMP => {
                    self.chunks.entry(chunk).or_insert(range);
                }
                _ => log::debug!("skipping {:?} chunk of {} bytes", chunk, range.len()),
            }
        }

        // Stray or missing metadata is common in the wild and not fatal.
        for (flag, chunk) in [
            (info.icc_profile, WebPRiffChunk::ICCP),
            (info.exif_metadata, WebPRiffChunk::EXIF),
            (info.xmp_metadata, WebPRiffChunk::XMP),
        ] {
            if flag != self.chunks.contains_key(&chunk) {
                log::debug!("VP8X {chunk:?} flag is {flag} but the chunk disagrees");
            }
        }

        let has_vp8 = self.chunks.contains_key(&WebPRiffChunk::VP8);
        let has_alph = self.chunks.contains_key(&WebPRiffChunk::ALPH);
        let (width, height) = match self.chunks.get(&WebPRiffChunk::VP8L) {
            Some(_) if has_vp8 || has_alph => return Err(DecodingError::InvalidChunkCombination),
            Some(range) => {
                let header = read_vp8l_header(&self.data[range.clone()])?;
                self.kind = ImageKind::Lossless;
                self.has_alpha = header.alpha_is_used;
                (u32::from(header.width), u32::from(header.height))
            }
            None => {
                let range = self
                    .chunks
                    .get(&WebPRiffChunk::VP8)
                    .ok_or(DecodingError::ChunkMissing)?;
                self.kind = ImageKind::Lossy;
                read_vp8_header(&self.data[range.clone()])?
            }
        };

        if (width, height) != (self.width, self.height) {
            return Err(DecodingError::InconsistentImageSizes);
        }
        self.has_alpha |= info.alpha || has_alph;

        Ok(())
    }

    /// Returns the (width, height) of the image in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns whether the image has an alpha channel. If so, the pixel format is Rgba8 and
    /// otherwise Rgb8.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Returns whether the image is lossy.
    pub fn is_lossy(&self) -> bool {
        self.kind == ImageKind::Lossy
    }

    fn chunk(&self, chunk: WebPRiffChunk) -> Option<&'a [u8]> {
        let data = self.data;
        self.chunks
            .get(&chunk)
            .and_then(|range| data.get(range.clone()))
    }

    /// Returns the raw bytes of the ICC profile, or None if there is no ICC profile.
    pub fn icc_profile(&self) -> Option<&'a [u8]> {
        self.chunk(WebPRiffChunk::ICCP)
    }

    /// Returns the raw bytes of the EXIF metadata, or None if there is no EXIF metadata.
    pub fn exif_metadata(&self) -> Option<&'a [u8]> {
        self.chunk(WebPRiffChunk::EXIF)
    }

    /// Returns the raw bytes of the XMP metadata, or None if there is no XMP metadata.
    pub fn xmp_metadata(&self) -> Option<&'a [u8]> {
        self.chunk(WebPRiffChunk::XMP)
    }

    /// Returns the number of bytes required to store the image, or None if that
    /// would take more than `usize::MAX` bytes.
    pub fn output_buffer_size(&self) -> Option<usize> {
        self.native_format().buffer_size(self.width, self.height)
    }

    fn native_format(&self) -> PixelFormat {
        if self.has_alpha {
            PixelFormat::Rgba
        } else {
            PixelFormat::Rgb
        }
    }

    /// Decodes the image into `buf`, as RGBA when [`has_alpha`](Self::has_alpha)
    /// and RGB otherwise.
    ///
    /// Fails with `ImageTooLarge` if `buf` has length different than `output_buffer_size()`
    pub fn read_image(&self, buf: &mut [u8]) -> Result<(), DecodingError> {
        if Some(buf.len()) != self.output_buffer_size() {
            return Err(DecodingError::ImageTooLarge);
        }
        self.decode_into(self.native_format(), buf)
    }

    /// Decodes the image into a freshly allocated buffer of the given format.
    pub fn decode(&self, format: PixelFormat) -> Result<DecodedImage, DecodingError> {
        let size = format
            .buffer_size(self.width, self.height)
            .ok_or(DecodingError::ImageTooLarge)?;
        self.config.limits.check_memory(size)?;

        let mut data = vec![0u8; size];
        self.decode_into(format, &mut data)?;

        Ok(DecodedImage {
            width: self.width,
            height: self.height,
            format,
            data,
        })
    }

    fn decode_into(&self, format: PixelFormat, buf: &mut [u8]) -> Result<(), DecodingError> {
        match self.kind {
            ImageKind::Lossy => self.decode_lossy(format, buf),
            ImageKind::Lossless => self.decode_lossless(format, buf),
        }
    }

    fn decode_lossy(&self, format: PixelFormat, buf: &mut [u8]) -> Result<(), DecodingError> {
        let frame = self.decode_vp8()?;
        let alpha = match self.chunk(WebPRiffChunk::ALPH) {
            Some(chunk) if matches!(format, PixelFormat::Rgba | PixelFormat::Yuva) => {
                Some(read_alpha_chunk(chunk, frame.width, frame.height)?)
            }
            _ => None,
        };
        let upsampling = self.config.upsampling;

        match format {
            PixelFormat::Rgb => frame.fill_rgb(buf, upsampling),
            PixelFormat::Rgba => {
                frame.fill_rgba(buf, upsampling);
                if let Some(alpha) = &alpha {
                    for (pixel, &a) in buf.chunks_exact_mut(4).zip(alpha) {
                        pixel[3] = a;
                    }
                }
            }
            PixelFormat::Yuv | PixelFormat::Yuva => {
                let (yuv, alpha_plane) = buf.split_at_mut(self.yuv_len());
                frame.fill_yuv420(yuv);
                match &alpha {
                    Some(alpha) => alpha_plane.copy_from_slice(&alpha[..alpha_plane.len()]),
                    None => alpha_plane.fill(255),
                }
            }
        }

        Ok(())
    }

    fn decode_vp8(&self) -> Result<Frame, DecodingError> {
        let data = self
            .chunk(WebPRiffChunk::VP8)
            .ok_or(DecodingError::ChunkMissing)?;
        let frame = Vp8Decoder::decode_frame(data)?;
        if u32::from(frame.width) != self.width || u32::from(frame.height) != self.height {
            return Err(DecodingError::InconsistentImageSizes);
        }
        Ok(frame)
    }

    fn decode_lossless(&self, format: PixelFormat, buf: &mut [u8]) -> Result<(), DecodingError> {
        let data = self
            .chunk(WebPRiffChunk::VP8L)
            .ok_or(DecodingError::ChunkMissing)?;
        let mut decoder = LosslessDecoder::new(data);

        if format == PixelFormat::Rgba {
            return decoder.decode_frame(self.width, self.height, false, buf);
        }

        let size = PixelFormat::Rgba
            .buffer_size(self.width, self.height)
            .ok_or(DecodingError::ImageTooLarge)?;
        self.config.limits.check_memory(size)?;
        let mut rgba = vec![0u8; size];
        decoder.decode_frame(self.width, self.height, false, &mut rgba)?;

        match format {
            PixelFormat::Rgb => {
                for (rgb, pixel) in buf.chunks_exact_mut(3).zip(rgba.chunks_exact(4)) {
                    rgb.copy_from_slice(&pixel[..3]);
                }
            }
            PixelFormat::Yuv | PixelFormat::Yuva => {
                let (yuv, alpha_plane) = buf.split_at_mut(self.yuv_len());
                let converted = yuv::convert_image_yuv::<4>(
                    &rgba,
                    self.width as usize,
                    self.height as usize,
                );
                yuv.copy_from_slice(&converted);
                for (a, pixel) in alpha_plane.iter_mut().zip(rgba.chunks_exact(4)) {
                    *a = pixel[3];
                }
            }
            PixelFormat::Rgba => {}
        }

        Ok(())
    }

    fn yuv_len(&self) -> usize {
        let width = self.width as usize;
        let height = self.height as usize;
        width * height + 2 * width.div_ceil(2) * height.div_ceil(2)
    }
}

pub(crate) fn read_fourcc(r: &mut SliceReader) -> Result<WebPRiffChunk, DecodingError> {
    let mut chunk_fourcc = [0; 4];
    r.read_exact(&mut chunk_fourcc)?;
    Ok(WebPRiffChunk::from_fourcc(chunk_fourcc))
}

/// Reads a chunk header and skips its payload and padding, returning the
/// payload's byte range.
pub(crate) fn read_chunk(
    r: &mut SliceReader,
) -> Result<(WebPRiffChunk, Range<usize>), DecodingError> {
    let chunk = read_fourcc(r)?;
    let size = usize::try_from(r.read_u32_le()?).map_err(|_| DecodingError::InvalidChunkSize)?;
    let start = r.position();
    r.skip(size)
        .map_err(|_| DecodingError::InvalidChunkSize)?;
    // The final pad byte is sometimes missing.
    if size % 2 == 1 && r.remaining() > 0 {
        r.skip(1)?;
    }
    Ok((chunk, start..start + size))
}

/// A simple-format file must not carry an alpha chunk.
fn reject_trailing_alpha(r: &mut SliceReader) -> Result<(), DecodingError> {
    while r.remaining() >= 8 {
        let (chunk, _) = read_chunk(r)?;
        if chunk == WebPRiffChunk::ALPH {
            return Err(DecodingError::InvalidChunkCombination);
        }
    }
    Ok(())
}

/// Parses the VP8 frame tag and key frame header far enough to get the size.
fn read_vp8_header(data: &[u8]) -> Result<(u32, u32), DecodingError> {
    let mut r = SliceReader::new(data);
    let tag = r.read_u24_le().map_err(|_| DecodingError::NotEnoughInitData)?;
    if tag & 1 != 0 {
        return Err(DecodingError::UnsupportedFeature(
            "Non-keyframe frames".into(),
        ));
    }

    let mut magic = [0u8; 3];
    r.read_exact(&mut magic)
        .map_err(|_| DecodingError::NotEnoughInitData)?;
    if magic != VP8_MAGIC {
        return Err(DecodingError::Vp8MagicInvalid(magic));
    }

    let width = u32::from(r.read_u16_le()? & 0x3FFF);
    let height = u32::from(r.read_u16_le()? & 0x3FFF);
    if width == 0 || height == 0 {
        return Err(DecodingError::InconsistentImageSizes);
    }
    Ok((width, height))
}

fn read_vp8l_header(data: &[u8]) -> Result<LosslessHeader, DecodingError> {
    let mut r = SliceReader::new(data);
    let signature = r.read_u8()?;
    if signature != LosslessHeader::SIGNATURE {
        return Err(DecodingError::LosslessSignatureInvalid(signature));
    }

    let header = r.read_u32_le()?;
    let version = header >> 29;
    if version != 0 {
        return Err(DecodingError::VersionNumberInvalid(version as u8));
    }

    Ok(LosslessHeader {
        width: (header & 0x3FFF) as u16 + 1,
        height: ((header >> 14) & 0x3FFF) as u16 + 1,
        alpha_is_used: (header >> 28) & 1 != 0,
    })
}

/// Image information obtained from WebP data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Whether the image uses lossless (VP8L) compression.
    pub is_lossless: bool,
    /// Whether the image has an alpha channel.
    pub has_alpha: bool,
}

/// Pixels decoded by [`read`], in a single allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Layout of `data`.
    pub format: PixelFormat,
    /// Pixel bytes, see [`PixelFormat`].
    pub data: Vec<u8>,
}

/// Borrowed planes of a [`DecodedImage`] in a YUV format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YuvPlanes<'a> {
    /// Luma, `y_stride` bytes per row.
    pub y: &'a [u8],
    /// Blue-difference chroma, `uv_stride` bytes per row.
    pub u: &'a [u8],
    /// Red-difference chroma, `uv_stride` bytes per row.
    pub v: &'a [u8],
    /// Alpha for [`PixelFormat::Yuva`], `a_stride` bytes per row.
    pub a: Option<&'a [u8]>,
    /// Row length of `y`.
    pub y_stride: usize,
    /// Row length of `u` and `v`; half the width, rounded up.
    pub uv_stride: usize,
    /// Row length of `a`.
    pub a_stride: usize,
}

impl DecodedImage {
    /// Splits a YUV or YUVA image into its planes. Returns `None` for RGB(A).
    pub fn unpack_yuv(&self) -> Option<YuvPlanes<'_>> {
        if !matches!(self.format, PixelFormat::Yuv | PixelFormat::Yuva) {
            return None;
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let uv_stride = width.div_ceil(2);
        let chroma_size = uv_stride * height.div_ceil(2);

        let (y, rest) = self.data.split_at_checked(width * height)?;
        let (u, rest) = rest.split_at_checked(chroma_size)?;
        let (v, rest) = rest.split_at_checked(chroma_size)?;
        let a = (self.format == PixelFormat::Yuva).then_some(rest);

        Some(YuvPlanes {
            y,
            u,
            v,
            a,
            y_stride: width,
            uv_stride,
            a_stride: width,
        })
    }
}

/// Decodes `data` into the requested pixel format with default settings.
///
/// # Example
///
/// ```rust,no_run
/// use zenwebp_decode::PixelFormat;
///
/// let webp_data: &[u8] = &[]; // your WebP data
/// let image = zenwebp_decode::read(webp_data, PixelFormat::Rgba)?;
/// assert_eq!(image.data.len(), image.width as usize * image.height as usize * 4);
/// # Ok::<(), zenwebp_decode::DecodingError>(())
/// ```
pub fn read(data: &[u8], format: PixelFormat) -> Result<DecodedImage, DecodingError> {
    read_with_config(data, format, &DecodeConfig::default())
}

/// Decodes `data` into the requested pixel format.
pub fn read_with_config(
    data: &[u8],
    format: PixelFormat,
    config: &DecodeConfig,
) -> Result<DecodedImage, DecodingError> {
    WebPDecoder::new_with_config(data, config.clone())?.decode(format)
}

/// Reads and decodes a WebP file.
#[cfg(feature = "std")]
pub fn read_path(
    path: impl AsRef<std::path::Path>,
    format: PixelFormat,
) -> Result<DecodedImage, DecodingError> {
    let data = std::fs::read(path)?;
    read(&data, format)
}

/// Reads the image size and kind from the headers without decoding pixels.
pub fn get_info(data: &[u8]) -> Result<ImageInfo, DecodingError> {
    let config = DecodeConfig::default().limits(Limits::none());
    let decoder = WebPDecoder::new_with_config(data, config)?;
    let (width, height) = decoder.dimensions();
    Ok(ImageInfo {
        width,
        height,
        is_lossless: !decoder.is_lossy(),
        has_alpha: decoder.has_alpha(),
    })
}

/// [`get_info`] for a file on disk.
#[cfg(feature = "std")]
pub fn get_info_path(path: impl AsRef<std::path::Path>) -> Result<ImageInfo, DecodingError> {
    let data = std::fs::read(path)?;
    get_info(&data)
}

/// Decode WebP data to RGBA pixels.
///
/// Returns the decoded pixels and dimensions.
///
/// # Example
///
/// ```rust,no_run
/// let webp_data: &[u8] = &[]; // your WebP data
/// let (pixels, width, height) = zenwebp_decode::decode_rgba(webp_data)?;
/// # Ok::<(), zenwebp_decode::DecodingError>(())
/// ```
pub fn decode_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32), DecodingError> {
    let image = read(data, PixelFormat::Rgba)?;
    Ok((image.data, image.width, image.height))
}

/// Decode WebP data to RGB pixels (no alpha).
///
/// Returns the decoded pixels and dimensions.
pub fn decode_rgb(data: &[u8]) -> Result<(Vec<u8>, u32, u32), DecodingError> {
    let image = read(data, PixelFormat::Rgb)?;
    Ok((image.data, image.width, image.height))
}

/// Decode WebP data to YUV 4:2:0 planes; see [`DecodedImage::unpack_yuv`].
///
/// Lossy images return the decoded planes. Lossless images are converted
/// from RGB.
pub fn decode_yuv420(data: &[u8]) -> Result<DecodedImage, DecodingError> {
    read(data, PixelFormat::Yuv)
}
