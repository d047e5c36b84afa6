//! Decoding of still WebP images
//!
//! This crate decodes the RIFF-based WebP container and both of its
//! bitstreams: VP8L (lossless) and VP8 (lossy, with an optional `ALPH`
//! alpha plane). Animation and encoding are not supported.
//!
//! # Features
//!
//! - `std` (default): path-based helpers and `std::io::Error` conversion.
//!
//! # no_std Support
//!
//! Decoding is fully supported in `no_std` environments (requires `alloc`):
//! ```toml
//! [dependencies]
//! zenwebp-decode = { version = "...", default-features = false }
//! ```
//!
//! All decoding functions take `&[u8]` slices directly - no Read/Seek traits required.
//!
//! # Decoding
//!
//! Pick an output layout with [`PixelFormat`]:
//!
//! ```rust,no_run
//! use zenwebp_decode::PixelFormat;
//!
//! let webp_data: &[u8] = &[]; // your WebP data
//! let image = zenwebp_decode::read(webp_data, PixelFormat::Yuv)?;
//! let planes = image.unpack_yuv().unwrap();
//! # let _ = planes;
//! # Ok::<(), zenwebp_decode::DecodingError>(())
//! ```
//!
//! Or use the [`WebPDecoder`] for more control:
//!
//! ```rust,no_run
//! use zenwebp_decode::WebPDecoder;
//!
//! let webp_data: &[u8] = &[]; // your WebP data
//! let decoder = WebPDecoder::new(webp_data)?;
//! let (width, height) = decoder.dimensions();
//! let mut output = vec![0u8; decoder.output_buffer_size().unwrap()];
//! decoder.read_image(&mut output)?;
//! # Ok::<(), zenwebp_decode::DecodingError>(())
//! ```
//!
//! Header fields are untrusted: [`Limits`] bounds image size and output memory
//! before anything is allocated.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

mod common;
pub mod decoder;

// Slice reader utility (used by the container and VP8 parsers)
mod slice_reader;

// Re-export decoder public API
pub use decoder::{
    decode_rgb, decode_rgba, decode_yuv420, get_info, read, read_with_config, DecodeConfig,
    DecodedImage, DecodingError, ImageInfo, Limits, PixelFormat, UpsamplingMethod, WebPDecoder,
    YuvPlanes,
};
#[cfg(feature = "std")]
pub use decoder::{get_info_path, read_path};
