//! Resource limits applied before any pixel buffer is allocated.
//!
//! Header fields are attacker controlled, so an image claiming to be
//! 16383 x 16383 is rejected here instead of in the allocator.

use super::api::DecodingError;

/// Caps on input size, image dimensions and output memory.
///
/// `None` disables a cap.
///
/// # Example
///
/// ```rust
/// use zenwebp_decode::Limits;
///
/// let limits = Limits::default()
///     .max_dimensions(4096, 4096)
///     .max_memory(64 * 1024 * 1024);
///
/// // Trusted inputs only.
/// let unlimited = Limits::none();
/// # let _ = (limits, unlimited);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Limits {
    /// Widest accepted image, in pixels.
    pub max_width: Option<u32>,

    /// Tallest accepted image, in pixels.
    pub max_height: Option<u32>,

    /// Largest accepted `width * height`.
    pub max_total_pixels: Option<u64>,

    /// Largest accepted input, in bytes.
    pub max_file_size: Option<u64>,

    /// Largest output buffer the decoder may allocate, in bytes.
    pub max_memory: Option<u64>,
}

impl Default for Limits {
    /// 16383 x 16383 (the largest a VP8 or VP8L header can describe),
    /// 100 megapixels, 100 MiB of input and 1 GiB of output.
    fn default() -> Self {
        Self {
            max_width: Some(16383),
            max_height: Some(16383),
            max_total_pixels: Some(100_000_000),
            max_file_size: Some(100 * 1024 * 1024),
            max_memory: Some(1024 * 1024 * 1024),
        }
    }
}

impl Limits {
    /// No caps at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_total_pixels: None,
            max_file_size: None,
            max_memory: None,
        }
    }

    /// Caps width and height.
    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Caps the pixel count.
    #[must_use]
    pub fn max_total_pixels(mut self, pixels: u64) -> Self {
        self.max_total_pixels = Some(pixels);
        self
    }

    /// Caps the input length.
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Caps the output buffer size.
    #[must_use]
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Fails with [`DecodingError::InvalidParameter`] when the image is too
    /// large along either axis or in total.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), DecodingError> {
        if let Some(max) = self.max_width.filter(|&max| width > max) {
            return Err(DecodingError::InvalidParameter(alloc::format!(
                "width {width} exceeds limit {max}"
            )));
        }
        if let Some(max) = self.max_height.filter(|&max| height > max) {
            return Err(DecodingError::InvalidParameter(alloc::format!(
                "height {height} exceeds limit {max}"
            )));
        }

        let pixels = u64::from(width) * u64::from(height);
        if let Some(max) = self.max_total_pixels.filter(|&max| pixels > max) {
            return Err(DecodingError::InvalidParameter(alloc::format!(
                "{pixels} pixels exceeds limit {max}"
            )));
        }

        Ok(())
    }

    /// Fails with [`DecodingError::InvalidParameter`] for oversized input.
    pub fn check_file_size(&self, size: u64) -> Result<(), DecodingError> {
        match self.max_file_size {
            Some(max) if size > max => Err(DecodingError::InvalidParameter(alloc::format!(
                "input of {size} bytes exceeds limit {max}"
            ))),
            _ => Ok(()),
        }
    }

    /// Fails with [`DecodingError::MemoryLimitExceeded`] when `bytes` is over
    /// the output cap.
    pub fn check_memory(&self, bytes: usize) -> Result<(), DecodingError> {
        match self.max_memory {
            Some(max) if bytes as u64 > max => Err(DecodingError::MemoryLimitExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_accept_largest_header() {
        let limits = Limits::default();
        assert!(limits.check_dimensions(16383, 1).is_ok());
        assert!(limits.check_dimensions(16384, 1).is_err());
        assert!(limits.check_dimensions(10_000, 10_001).is_err());
    }

    #[test]
    fn per_axis_caps() {
        let limits = Limits::none().max_dimensions(1000, 20);
        assert!(limits.check_dimensions(1000, 20).is_ok());
        assert!(matches!(
            limits.check_dimensions(1001, 1),
            Err(DecodingError::InvalidParameter(_))
        ));
        assert!(limits.check_dimensions(1, 21).is_err());
    }

    #[test]
    fn pixel_count_cap() {
        let limits = Limits::none().max_total_pixels(1_000_000);
        assert!(limits.check_dimensions(1000, 1000).is_ok());
        assert!(limits.check_dimensions(1001, 1000).is_err());
    }

    #[test]
    fn file_and_memory_caps() {
        let limits = Limits::none().max_file_size(100).max_memory(400);
        assert!(limits.check_file_size(100).is_ok());
        assert!(limits.check_file_size(101).is_err());
        assert!(limits.check_memory(400).is_ok());
        assert!(matches!(
            limits.check_memory(401),
            Err(DecodingError::MemoryLimitExceeded)
        ));
    }

    #[test]
    fn none_is_unbounded() {
        let limits = Limits::none();
        assert!(limits.check_dimensions(u32::MAX, u32::MAX).is_ok());
        assert!(limits.check_file_size(u64::MAX).is_ok());
        assert!(limits.check_memory(usize::MAX).is_ok());
    }
}
