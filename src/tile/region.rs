//! Compositing arbitrary pixel regions from a level's tiles.
//!
//! A read fills the destination with the background colour, then paints
//! every intersecting tile in index order. Later tiles overwrite earlier ones
//! where footprints overlap. Nothing here fails: unreadable tiles are logged
//! and skipped, invalid requests leave the buffer as background.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::pyramid::{PyramidModel, Tile};

use super::decoder::{DecodedTile, TileDecoder, TileRegion};

/// Background byte used for pixels no tile covers.
pub const DEFAULT_BACKGROUND: u8 = 0xFF;

/// Bytes per destination pixel (interleaved R, G, B).
pub const BYTES_PER_PIXEL: usize = 3;

/// Outcome of one region read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionSummary {
    /// Tiles painted into the destination
    pub tiles_composited: usize,

    /// Tiles that intersected but could not be decoded or copied
    pub tiles_failed: usize,
}

/// Destination rectangle in level pixels.
#[derive(Debug, Clone, Copy)]
struct Rect {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
}

impl Rect {
    fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }
}

/// Reads rectangular regions out of a pyramid.
#[derive(Clone)]
pub struct RegionReader {
    decoder: Arc<dyn TileDecoder>,
    background: u8,
}

impl RegionReader {
    /// Create a reader with the default white background.
    pub fn new(decoder: Arc<dyn TileDecoder>) -> Self {
        Self {
            decoder,
            background: DEFAULT_BACKGROUND,
        }
    }

    /// Set the background byte.
    pub fn with_background(mut self, background: u8) -> Self {
        self.background = background;
        self
    }

    /// The background byte.
    pub fn background(&self) -> u8 {
        self.background
    }

    /// The decoder tiles are read with.
    pub fn decoder(&self) -> &Arc<dyn TileDecoder> {
        &self.decoder
    }

    /// Bytes needed for a `width x height` region.
    pub fn buffer_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Read a region into `dest` as row-major interleaved RGB.
    ///
    /// `(x, y)` is the top-left corner in pixels of the exposed level
    /// `level`. Only the first `width * height * 3` bytes of `dest` are
    /// touched. If the size is zero or `dest` is too small, `dest` is left
    /// untouched; otherwise it is background-filled first, so an invalid
    /// level or an out-of-bounds rectangle yields pure background.
    #[allow(clippy::too_many_arguments)]
    pub fn read_region(
        &self,
        pyramid: &PyramidModel,
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        dest: &mut [u8],
    ) -> RegionSummary {
        let mut summary = RegionSummary::default();

        if width == 0 || height == 0 {
            warn!(width, height, "Ignoring region read with zero size");
            return summary;
        }
        let needed = Self::buffer_len(width, height);
        if dest.len() < needed {
            warn!(needed, actual = dest.len(), "Destination buffer too small for region");
            return summary;
        }

        let dest = &mut dest[..needed];
        dest.fill(self.background);

        let Some(calibrated) = pyramid.level(level) else {
            warn!(
                level,
                levels = pyramid.level_count(),
                "Region read on missing level, returning background"
            );
            return summary;
        };

        let rect = Rect {
            x,
            y,
            width,
            height,
        };
        let total_width = calibrated.total_width as i64;
        let total_height = calibrated.total_height as i64;
        if x >= total_width || y >= total_height || rect.right() <= 0 || rect.bottom() <= 0 {
            debug!(level, x, y, width, height, "Region entirely outside level");
            return summary;
        }

        // Tiles may reach past the level's totals; those pixels stay background
        let left = x.max(0);
        let top = y.max(0);
        let visible = Rect {
            x: left,
            y: top,
            width: (rect.right().min(total_width) - left) as u32,
            height: (rect.bottom().min(total_height) - top) as u32,
        };

        let tile_size = (calibrated.tile_width, calibrated.tile_height);
        for tile in calibrated.tiles_intersecting(visible.x, visible.y, visible.width, visible.height)
        {
            if self.paint_tile(tile, tile_size, &rect, &visible, dest) {
                summary.tiles_composited += 1;
            } else {
                summary.tiles_failed += 1;
            }
        }

        debug!(
            level,
            x,
            y,
            width,
            height,
            composited = summary.tiles_composited,
            failed = summary.tiles_failed,
            "Region read"
        );
        summary
    }

    /// Convenience wrapper allocating the destination buffer.
    pub fn read_region_vec(
        &self,
        pyramid: &PyramidModel,
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    ) -> (Vec<u8>, RegionSummary) {
        let mut buffer = vec![self.background; Self::buffer_len(width, height)];
        let summary = self.read_region(pyramid, level, x, y, width, height, &mut buffer);
        (buffer, summary)
    }

    /// Decode the overlap of one tile with `visible` and copy it into `dest`.
    ///
    /// `visible` is the part of `rect` inside the level; `dest` is laid out
    /// over the whole of `rect`.
    fn paint_tile(
        &self,
        tile: &Tile,
        tile_size: (u32, u32),
        rect: &Rect,
        visible: &Rect,
        dest: &mut [u8],
    ) -> bool {
        let left = visible.x.max(tile.x_pixel);
        let top = visible.y.max(tile.y_pixel);
        let right = visible.right().min(tile.x_pixel + tile_size.0 as i64);
        let bottom = visible.bottom().min(tile.y_pixel + tile_size.1 as i64);
        if right <= left || bottom <= top {
            return false;
        }

        // Both differences are bounded by u32 tile and region sizes
        let region = TileRegion {
            x: (left - tile.x_pixel) as u32,
            y: (top - tile.y_pixel) as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        };

        let decoded = match self.decoder.decode_region(&tile.path, region) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(path = %tile.path.display(), error = %e, "Skipping unreadable tile");
                return false;
            }
        };

        let dest_x = (left - rect.x) as usize;
        let dest_y = (top - rect.y) as usize;
        copy_planes(
            &decoded,
            region,
            dest,
            rect.width as usize,
            (dest_x, dest_y),
            &tile.path,
        )
    }
}

impl std::fmt::Debug for RegionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionReader")
            .field("background", &self.background)
            .finish()
    }
}

/// Copy decoded planes into an interleaved RGB destination.
///
/// Copies at most `region`'s size, and never more than was decoded.
/// Three-plane tiles are stored B, G, R and land as R, G, B; one-plane tiles
/// are replicated into all three channels.
fn copy_planes(
    decoded: &DecodedTile,
    region: TileRegion,
    dest: &mut [u8],
    dest_stride_px: usize,
    dest_origin: (usize, usize),
    path: &std::path::Path,
) -> bool {
    if !decoded.is_well_formed() {
        warn!(
            path = %path.display(),
            expected = decoded.plane_len() * decoded.channels as usize,
            actual = decoded.data.len(),
            "Decoded tile buffer does not match its size"
        );
        return false;
    }

    let planes: [&[u8]; 3] = match decoded.channels {
        1 => match decoded.plane(0) {
            Some(gray) => [gray, gray, gray],
            None => return false,
        },
        3 => match (decoded.plane(2), decoded.plane(1), decoded.plane(0)) {
            (Some(r), Some(g), Some(b)) => [r, g, b],
            _ => return false,
        },
        other => {
            warn!(path = %path.display(), channels = other, "Unsupported channel count");
            return false;
        }
    };

    let src_width = decoded.width as usize;
    let copy_width = src_width.min(region.width as usize);
    let copy_height = (decoded.height as usize).min(region.height as usize);
    let (dest_x, dest_y) = dest_origin;

    for row in 0..copy_height {
        let src_row = row * src_width;
        let dest_row = ((dest_y + row) * dest_stride_px + dest_x) * BYTES_PER_PIXEL;
        for col in 0..copy_width {
            let out = dest_row + col * BYTES_PER_PIXEL;
            let src = src_row + col;
            dest[out] = planes[0][src];
            dest[out + 1] = planes[1][src];
            dest[out + 2] = planes[2][src];
        }
    }
    true
}

// =============================================================================
// Tests
// =============================================================================
