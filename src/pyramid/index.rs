//! Placing tiles in pixel space.
//!
//! Stage coordinates grow in the opposite direction of pixel coordinates, so
//! a tile's origin is its distance from the level's largest stage coordinate,
//! converted to pixels. The resulting index is sorted in raster order, which
//! is also the order overlapping tiles are painted in.

use crate::format::RawTile;

use super::level::Tile;

/// Geometry needed to place a level's tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexGeometry {
    /// Largest tile stage X coordinate
    pub max_x: i64,

    /// Largest tile stage Y coordinate
    pub max_y: i64,

    /// Stage units per pixel along X
    pub adj_x: f64,

    /// Stage units per pixel along Y
    pub adj_y: f64,

    /// Cross-level alignment offset in pixels
    pub offset: (i64, i64),
}

/// Compute one pixel origin.
///
/// The alignment offset is added before truncating toward zero.
pub fn pixel_origin(max: i64, stage: i64, adj: f64, offset: i64) -> i64 {
    let pixel = (max - stage) as f64 / adj + offset as f64;
    pixel as i64
}

/// Build the sorted tile index for one level.
///
/// Tiles are ordered by `(y_pixel, x_pixel)`; tiles landing on the same
/// origin keep their calibration-file order.
pub fn build_tile_index(tiles: &[RawTile], geometry: &IndexGeometry) -> Vec<Tile> {
    let mut index: Vec<Tile> = tiles
        .iter()
        .map(|raw| Tile {
            stage_x: raw.stage_x,
            stage_y: raw.stage_y,
            x_pixel: pixel_origin(geometry.max_x, raw.stage_x, geometry.adj_x, geometry.offset.0),
            y_pixel: pixel_origin(geometry.max_y, raw.stage_y, geometry.adj_y, geometry.offset.1),
            path: raw.path.clone(),
        })
        .collect();

    index.sort_by_key(|tile| (tile.y_pixel, tile.x_pixel));
    index
}

// =============================================================================
// Tests
// =============================================================================
