//! Calibrated level and tile records.
//!
//! These are produced once by the calibrator and never mutated afterwards;
//! the pyramid hands out shared references only.

use std::path::PathBuf;

use crate::format::LevelSlot;

// =============================================================================
// Step Size
// =============================================================================

/// How a level's step size along one axis was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSource {
    /// Configured explicitly in the level header
    Configured,

    /// Inherited from the next finer level, scaled by the tier ratio
    Inherited,

    /// Smallest observed pitch between adjacent tiles
    Pitch,

    /// Magnitude of the largest stage coordinate (lowest confidence)
    Fallback,
}

/// Stage distance between adjacent tile origins along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
    /// Distance in stage units
    pub value: i64,

    /// Where the value came from
    pub source: StepSource,
}

impl StepSize {
    /// Whether the step size is trusted enough to derive geometry from.
    pub fn is_known(&self) -> bool {
        self.source != StepSource::Fallback
    }
}

// =============================================================================
// Tile
// =============================================================================

/// One tile file placed in its level's pixel space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Stage X coordinate from the calibration file
    pub stage_x: i64,

    /// Stage Y coordinate from the calibration file
    pub stage_y: i64,

    /// Left edge in level pixels (may be negative after alignment)
    pub x_pixel: i64,

    /// Top edge in level pixels (may be negative after alignment)
    pub y_pixel: i64,

    /// Image file backing this tile
    pub path: PathBuf,
}

// =============================================================================
// Level
// =============================================================================

/// A calibrated pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Scan tier this level was read from
    pub slot: LevelSlot,

    /// Calibration file the level was read from
    pub source: Option<PathBuf>,

    /// Tile width in pixels
    pub tile_width: u32,

    /// Tile height in pixels
    pub tile_height: u32,

    /// Step size along X
    pub step_x: StepSize,

    /// Step size along Y
    pub step_y: StepSize,

    /// Stage units per pixel along X (`step_x / tile_width`)
    pub adj_x: f64,

    /// Stage units per pixel along Y (`step_y / tile_height`)
    pub adj_y: f64,

    /// Resolved stage X axis reference
    pub stage_ref_x: i64,

    /// Resolved stage Y axis reference
    pub stage_ref_y: i64,

    /// Smallest tile stage X coordinate
    pub min_x: i64,

    /// Largest tile stage X coordinate
    pub max_x: i64,

    /// Smallest tile stage Y coordinate
    pub min_y: i64,

    /// Largest tile stage Y coordinate
    pub max_y: i64,

    /// Level width in pixels
    pub total_width: u32,

    /// Level height in pixels
    pub total_height: u32,

    /// Pixel offset added to every tile origin to line up with a coarser level
    pub alignment: (i64, i64),

    /// Tiles sorted by `(y_pixel, x_pixel)`
    pub tiles: Vec<Tile>,
}

impl Level {
    /// Whether both step sizes are known.
    pub fn knows_step_sizes(&self) -> bool {
        self.step_x.is_known() && self.step_y.is_known()
    }

    /// Pixel area, used to order levels for exposure.
    pub fn area(&self) -> u64 {
        self.total_width as u64 * self.total_height as u64
    }

    /// Number of tile files in this level.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tiles whose footprint overlaps the given pixel rectangle, in index order.
    ///
    /// Footprints use the level's nominal tile size. A level holds at most a
    /// few thousand tiles, so this is a linear scan.
    pub fn tiles_intersecting(
        &self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    ) -> impl Iterator<Item = &Tile> + '_ {
        let right = x + width as i64;
        let bottom = y + height as i64;
        let tile_width = self.tile_width as i64;
        let tile_height = self.tile_height as i64;

        self.tiles.iter().filter(move |tile| {
            tile.x_pixel < right
                && tile.x_pixel + tile_width > x
                && tile.y_pixel < bottom
                && tile.y_pixel + tile_height > y
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
