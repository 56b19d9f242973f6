//! The opened, read-only pyramid of a dataset.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::OpenError;
use crate::format::{dataset_dir, locate_calibration, parse_level, IniDocument, LevelSlot, RawLevel};
use crate::tile::TileDecoder;

use super::calibrate::LevelCalibrator;
use super::level::Level;

/// Objective magnification assumed when no level declares one.
pub const DEFAULT_MAGNIFICATION: f64 = 40.0;

/// Tile size reported for a pyramid without levels.
pub const DEFAULT_TILE_SIZE: (u32, u32) = (752, 480);

// =============================================================================
// LevelInfo
// =============================================================================

/// Snapshot of one exposed level's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Stage units per pixel along X
    pub physical_scale_x: f64,

    /// Stage units per pixel along Y
    pub physical_scale_y: f64,

    /// Width of each tile file in pixels
    pub tile_width: u32,

    /// Height of each tile file in pixels
    pub tile_height: u32,

    /// Number of tile files
    pub tile_count: usize,

    /// Scan tier the level came from
    #[serde(serialize_with = "serialize_slot")]
    pub slot: LevelSlot,

    /// Width of level 0 divided by the width of this level
    pub downsample: f64,
}

fn serialize_slot<S: serde::Serializer>(slot: &LevelSlot, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(slot.name())
}

// =============================================================================
// PyramidModel
// =============================================================================

/// A calibrated multi-level dataset.
///
/// Levels are exposed largest first. The model is immutable once opened and
/// can be shared freely between readers.
#[derive(Debug, Clone)]
pub struct PyramidModel {
    dir: PathBuf,
    levels: Vec<Level>,
    magnification: f64,
}

impl PyramidModel {
    /// Open a dataset.
    ///
    /// `path` is the dataset directory or any file inside it. Opening never
    /// fails: a dataset without usable levels yields an invalid pyramid with
    /// zero levels, which reads as background.
    pub fn open(path: &Path, decoder: &dyn TileDecoder) -> Self {
        let dir = dataset_dir(path);
        info!(dir = %dir.display(), "Opening dataset");

        let raw_levels: Vec<RawLevel> = LevelSlot::ALL
            .into_iter()
            .map(|slot| read_raw_level(&dir, slot, decoder))
            .collect();

        let magnification = raw_levels
            .iter()
            .filter_map(|raw| raw.header.as_ref()?.magnification)
            .last()
            .unwrap_or(DEFAULT_MAGNIFICATION);

        let levels = LevelCalibrator::new().calibrate(&raw_levels);

        if levels.is_empty() {
            warn!(dir = %dir.display(), "No level could be calibrated, pyramid is invalid");
        } else {
            info!(
                dir = %dir.display(),
                levels = levels.len(),
                width = levels[0].total_width,
                height = levels[0].total_height,
                "Dataset opened"
            );
        }

        Self {
            dir,
            levels,
            magnification,
        }
    }

    /// Open a dataset, failing when it has no usable levels.
    pub fn try_open(path: &Path, decoder: &dyn TileDecoder) -> Result<Self, OpenError> {
        let model = Self::open(path, decoder);
        if model.is_valid() {
            Ok(model)
        } else {
            Err(OpenError::NoLevels {
                path: model.dir.display().to_string(),
            })
        }
    }

    /// Dataset directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether at least one level was calibrated.
    pub fn is_valid(&self) -> bool {
        !self.levels.is_empty()
    }

    /// Number of exposed levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Exposed level by index (0 is the largest).
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    /// All exposed levels, largest first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Pixel size of level 0.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    /// Pixel size of an exposed level.
    pub fn level_dimensions(&self, index: usize) -> Option<(u32, u32)> {
        self.level(index).map(|l| (l.total_width, l.total_height))
    }

    /// Metadata snapshot of an exposed level.
    pub fn level_info(&self, index: usize) -> Option<LevelInfo> {
        let level = self.level(index)?;
        let base_width = self.levels.first()?.total_width as f64;

        Some(LevelInfo {
            width: level.total_width,
            height: level.total_height,
            physical_scale_x: level.adj_x,
            physical_scale_y: level.adj_y,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
            tile_count: level.tile_count(),
            slot: level.slot,
            downsample: base_width / level.total_width as f64,
        })
    }

    /// Nominal objective magnification.
    pub fn magnification(&self) -> f64 {
        self.magnification
    }

    /// Tile pixel size of level 0.
    pub fn optimal_tile_size(&self) -> (u32, u32) {
        self.level(0)
            .map(|l| (l.tile_width, l.tile_height))
            .unwrap_or(DEFAULT_TILE_SIZE)
    }

    /// Every calibration file and tile file backing the exposed levels.
    pub fn used_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for level in &self.levels {
            files.extend(level.source.iter().cloned());
            files.extend(level.tiles.iter().map(|t| t.path.clone()));
        }
        files
    }

    /// Index of the smallest exposed level.
    pub fn coarsest_level(&self) -> Option<usize> {
        self.levels.len().checked_sub(1)
    }
}

/// Locate, read and parse one slot, probing the first tile for its size.
fn read_raw_level(dir: &Path, slot: LevelSlot, decoder: &dyn TileDecoder) -> RawLevel {
    let Some(path) = locate_calibration(dir, slot) else {
        return RawLevel::missing(slot);
    };

    let doc = match IniDocument::read(&path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(slot = %slot, error = %e, "Failed to read calibration file");
            let mut raw = RawLevel::missing(slot);
            raw.source = Some(path);
            return raw;
        }
    };

    let mut raw = parse_level(slot, &path, &doc, dir);

    if raw.header.is_some() {
        if let Some(first) = raw.tiles.first() {
            match decoder.dimensions(&first.path) {
                Ok((width, height)) if width > 0 && height > 0 => {
                    debug!(slot = %slot, width, height, "Probed tile size");
                    raw.tile_size = Some((width, height));
                }
                Ok(_) => warn!(slot = %slot, path = %first.path.display(), "First tile is empty"),
                Err(e) => warn!(
                    slot = %slot,
                    error = %e,
                    "Could not probe first tile, using header tile size"
                ),
            }
        }
    }

    if !raw.is_found() {
        warn!(slot = %slot, path = %path.display(), "Level not found");
    }
    raw
}

// =============================================================================
// Tests
// =============================================================================
