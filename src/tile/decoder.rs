//! Tile decoding.
//!
//! Region reads only ever need part of a tile, so the decoder interface takes
//! a sub-rectangle and returns planar pixel data. Colour tiles come back as
//! three planes in B, G, R order; grayscale tiles as a single plane. The
//! region reader is responsible for swapping or replicating channels.

use std::path::Path;

use image::{DynamicImage, ImageReader};

use crate::error::{DecodeError, IoError};

// =============================================================================
// Types
// =============================================================================

/// Sub-rectangle of a tile, in tile-local pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Planar pixel data decoded from a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    /// Width of the decoded rectangle
    pub width: u32,

    /// Height of the decoded rectangle
    pub height: u32,

    /// Number of planes: 1 (grayscale) or 3 (B, G, R)
    pub channels: u8,

    /// `channels` consecutive planes of `width * height` bytes
    pub data: Vec<u8>,
}

impl DecodedTile {
    /// Size of one plane in bytes.
    pub fn plane_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Plane `index`, if the buffer holds it.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let len = self.plane_len();
        let start = index.checked_mul(len)?;
        self.data.get(start..start.checked_add(len)?)
    }

    /// Whether the buffer length matches the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.plane_len() * self.channels as usize
    }
}

// =============================================================================
// TileDecoder Trait
// =============================================================================

/// Decodes tile image files.
///
/// Implementations must be shareable across threads; the region service
/// decodes on the blocking pool.
pub trait TileDecoder: Send + Sync {
    /// Pixel size of a tile file, read without decoding pixels where possible.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), DecodeError>;

    /// Decode a sub-rectangle of a tile file.
    ///
    /// The rectangle is clipped to the image; the returned tile reports the
    /// size actually decoded, which may be smaller than requested.
    fn decode_region(&self, path: &Path, region: TileRegion) -> Result<DecodedTile, DecodeError>;
}

// =============================================================================
// ImageTileDecoder
// =============================================================================

/// [`TileDecoder`] backed by the `image` crate.
///
/// Each call opens, decodes and drops the file; no handles are kept.
#[derive(Debug, Clone, Default)]
pub struct ImageTileDecoder;

impl ImageTileDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, DecodeError> {
        let display = path.display().to_string();
        let reader = ImageReader::open(path).map_err(|e| IoError::from_std(display.clone(), &e))?;
        reader
            .with_guessed_format()
            .map_err(|e| DecodeError::from(IoError::from_std(display, &e)))
    }
}

impl TileDecoder for ImageTileDecoder {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), DecodeError> {
        Self::open(path)?
            .into_dimensions()
            .map_err(|e| DecodeError::Image {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn decode_region(&self, path: &Path, region: TileRegion) -> Result<DecodedTile, DecodeError> {
        let image = Self::open(path)?.decode().map_err(|e| DecodeError::Image {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(crop_to_planes(&image, region))
    }
}

/// Crop a decoded image and split it into planes.
pub fn crop_to_planes(image: &DynamicImage, region: TileRegion) -> DecodedTile {
    let x = region.x.min(image.width());
    let y = region.y.min(image.height());
    let width = region.width.min(image.width() - x);
    let height = region.height.min(image.height() - y);
    let cropped = image.crop_imm(x, y, width, height);

    if !cropped.color().has_color() {
        return DecodedTile {
            width,
            height,
            channels: 1,
            data: cropped.to_luma8().into_raw(),
        };
    }

    let rgb = cropped.to_rgb8();
    let plane_len = width as usize * height as usize;
    let mut data = vec![0u8; plane_len * 3];
    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = pixel[2];
        data[plane_len + i] = pixel[1];
        data[2 * plane_len + i] = pixel[0];
    }

    DecodedTile {
        width,
        height,
        channels: 3,
        data,
    }
}

// =============================================================================
// Tests
// =============================================================================
