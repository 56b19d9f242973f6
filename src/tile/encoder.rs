//! JPEG encoding of composited regions.
//!
//! Region reads produce interleaved RGB; this module turns that buffer into
//! a JPEG at a requested quality, optionally downscaling first (thumbnails).

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::RegionError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Whether `quality` is within 1-100.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp `quality` into 1-100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

/// Encodes RGB pixel buffers as JPEG.
#[derive(Debug, Clone, Default)]
pub struct RegionEncoder;

impl RegionEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a `width x height` interleaved RGB buffer.
    pub fn encode_rgb(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Bytes, RegionError> {
        let image = Self::to_image(pixels, width, height)?;
        Self::encode_image(&image, quality)
    }

    /// Downscale an RGB buffer so its longest side is at most `max_size`,
    /// then encode it. Smaller images are encoded unchanged.
    pub fn encode_rgb_fitted(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        max_size: u32,
        quality: u8,
    ) -> Result<Bytes, RegionError> {
        let image = Self::to_image(pixels, width, height)?;
        let (fit_width, fit_height) = fit_within(width, height, max_size);
        if (fit_width, fit_height) == (width, height) {
            return Self::encode_image(&image, quality);
        }

        let resized = imageops::resize(&image, fit_width, fit_height, FilterType::Triangle);
        Self::encode_image(&resized, quality)
    }

    fn to_image(pixels: Vec<u8>, width: u32, height: u32) -> Result<RgbImage, RegionError> {
        let actual = pixels.len();
        RgbImage::from_raw(width, height, pixels).ok_or_else(|| RegionError::EncodeError {
            message: format!(
                "buffer of {} bytes does not hold a {}x{} RGB image",
                actual, width, height
            ),
        })
    }

    fn encode_image(image: &RgbImage, quality: u8) -> Result<Bytes, RegionError> {
        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, clamp_quality(quality))
            .encode_image(image)
            .map_err(|e| RegionError::EncodeError {
                message: e.to_string(),
            })?;
        Ok(Bytes::from(output))
    }
}

/// Size that fits `width x height` within `max_size` while keeping aspect.
///
/// Never returns a zero dimension for a non-empty input.
pub fn fit_within(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_size || longest == 0 {
        return (width, height);
    }
    let scale = max_size as f64 / longest as f64;
    let fit = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    (fit(width), fit(height))
}

// =============================================================================
// Tests
// =============================================================================
