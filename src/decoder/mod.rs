//! WebP decoder implementation

mod api;
pub(crate) mod arithmetic;
mod bit_reader;
mod extended;
mod huffman;
mod limits;
mod loop_filter;
mod lossless;
mod lossless_transform;
mod vp8;
pub(crate) mod yuv;

// Re-export public API
pub use api::{
    decode_rgb, decode_rgba, decode_yuv420, get_info, read, read_with_config, DecodeConfig,
    DecodedImage, DecodingError, ImageInfo, PixelFormat, UpsamplingMethod, WebPDecoder,
    YuvPlanes,
};
#[cfg(feature = "std")]
pub use api::{get_info_path, read_path};
pub use limits::Limits;
