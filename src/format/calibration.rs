//! Turning one parsed calibration file into a raw, uncalibrated level.
//!
//! The `Header` section carries level-wide numbers; every other section is a
//! tile positioned by stage coordinates. Nothing here is inferred: missing
//! numbers stay `None` and are resolved later by the calibrator.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::discovery::{tile_path, LevelSlot};
use super::ini::{IniDocument, IniSection};

// =============================================================================
// Header Keys
// =============================================================================

const HEADER_SECTION: &str = "Header";
const KEY_IMAGE_WIDTH: &str = "iImageWidth";
const KEY_IMAGE_HEIGHT: &str = "iImageHeight";
const KEY_X_STAGE_REF: &str = "lXStageRef";
const KEY_Y_STAGE_REF: &str = "lYStageRef";
const KEY_X_STEP_SIZE: &str = "lXStepSize";
const KEY_Y_STEP_SIZE: &str = "lYStepSize";
const KEY_X_OFFSET: &str = "lXOffset";
const KEY_Y_OFFSET: &str = "lYOffset";
const KEY_MAGNIFICATION: &str = "dMagnification";
const KEY_X: &str = "x";
const KEY_Y: &str = "y";

// =============================================================================
// LevelHeader
// =============================================================================

/// Numeric fields of a level's `Header` section.
///
/// A field is `None` when the key is absent or its value does not parse,
/// which keeps a legitimate zero distinct from "unknown".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelHeader {
    /// Tile width in pixels (`iImageWidth`)
    pub image_width: Option<i64>,

    /// Tile height in pixels (`iImageHeight`)
    pub image_height: Option<i64>,

    /// Stage X axis reference (`x` if present, else `lXStageRef`)
    pub stage_ref_x: Option<i64>,

    /// Stage Y axis reference (`y` if present, else `lYStageRef`)
    pub stage_ref_y: Option<i64>,

    /// Stage distance between horizontally adjacent tiles (`lXStepSize`)
    pub step_x: Option<i64>,

    /// Stage distance between vertically adjacent tiles (`lYStepSize`)
    pub step_y: Option<i64>,

    /// Stage X offset (`lXOffset`)
    pub offset_x: Option<i64>,

    /// Stage Y offset (`lYOffset`)
    pub offset_y: Option<i64>,

    /// Objective magnification (`dMagnification`)
    pub magnification: Option<f64>,
}

impl LevelHeader {
    /// Read the header fields from a section.
    pub fn from_section(section: &IniSection) -> Self {
        Self {
            image_width: parse_int(section, KEY_IMAGE_WIDTH),
            image_height: parse_int(section, KEY_IMAGE_HEIGHT),
            stage_ref_x: parse_int(section, KEY_X).or_else(|| parse_int(section, KEY_X_STAGE_REF)),
            stage_ref_y: parse_int(section, KEY_Y).or_else(|| parse_int(section, KEY_Y_STAGE_REF)),
            step_x: parse_int(section, KEY_X_STEP_SIZE),
            step_y: parse_int(section, KEY_Y_STEP_SIZE),
            offset_x: parse_int(section, KEY_X_OFFSET),
            offset_y: parse_int(section, KEY_Y_OFFSET),
            magnification: parse_float(section, KEY_MAGNIFICATION),
        }
    }

    /// Tile pixel size declared by the header, if both dimensions are positive.
    pub fn declared_tile_size(&self) -> Option<(u32, u32)> {
        let width = self.image_width.and_then(positive_u32)?;
        let height = self.image_height.and_then(positive_u32)?;
        Some((width, height))
    }
}

// =============================================================================
// RawTile / RawLevel
// =============================================================================

/// A tile entry as listed in the calibration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTile {
    /// Stage X coordinate
    pub stage_x: i64,

    /// Stage Y coordinate
    pub stage_y: i64,

    /// Image file backing this tile
    pub path: PathBuf,
}

/// One slot's calibration data before any inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLevel {
    /// Scan tier this level came from
    pub slot: LevelSlot,

    /// Calibration file the level was read from
    pub source: Option<PathBuf>,

    /// Header fields; `None` when the file had no `Header` section
    pub header: Option<LevelHeader>,

    /// Tile pixel size, from the header or from probing the first tile
    pub tile_size: Option<(u32, u32)>,

    /// Tile entries in file order
    pub tiles: Vec<RawTile>,
}

impl RawLevel {
    /// A slot with no calibration file.
    pub fn missing(slot: LevelSlot) -> Self {
        Self {
            slot,
            source: None,
            header: None,
            tile_size: None,
            tiles: Vec::new(),
        }
    }

    /// Whether this level can take part in calibration.
    pub fn is_found(&self) -> bool {
        self.header.is_some() && !self.tiles.is_empty() && self.tile_size.is_some()
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Build a raw level from a parsed calibration file.
///
/// `dir` is the dataset directory; tile file paths are resolved against it.
/// A file without a `Header` section yields a level that is not found and
/// has no tiles.
pub fn parse_level(slot: LevelSlot, source: &Path, doc: &IniDocument, dir: &Path) -> RawLevel {
    let mut level = RawLevel::missing(slot);
    level.source = Some(source.to_path_buf());

    let Some(header_section) = doc.section_ignore_case(HEADER_SECTION) else {
        warn!(slot = %slot, path = %source.display(), "Calibration file has no Header section");
        return level;
    };

    let header = LevelHeader::from_section(header_section);
    debug!(slot = %slot, ?header, "Parsed level header");

    level.tile_size = header.declared_tile_size();
    level.header = Some(header);

    for section in doc.sections() {
        let name = section.name();
        if name.is_empty() || name.eq_ignore_ascii_case(HEADER_SECTION) {
            continue;
        }

        match (parse_int(section, KEY_X), parse_int(section, KEY_Y)) {
            (Some(stage_x), Some(stage_y)) => level.tiles.push(RawTile {
                stage_x,
                stage_y,
                path: tile_path(dir, name),
            }),
            _ => debug!(slot = %slot, section = name, "Skipping section without stage coordinates"),
        }
    }

    debug!(slot = %slot, tiles = level.tiles.len(), "Collected tile entries");
    level
}

fn parse_int(section: &IniSection, key: &str) -> Option<i64> {
    let value = section.get(key)?;
    if value.is_empty() {
        return None;
    }
    match value.parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(section = section.name(), key, value, "Ignoring non-integer value");
            None
        }
    }
}

fn parse_float(section: &IniSection, key: &str) -> Option<f64> {
    let value = section.get(key)?;
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!(section = section.name(), key, value, "Ignoring non-numeric value");
            None
        }
    }
}

fn positive_u32(value: i64) -> Option<u32> {
    if value > 0 {
        u32::try_from(value).ok()
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
