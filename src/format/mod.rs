//! Dataset format: calibration files and tile layout on disk.
//!
//! A dataset is a directory holding up to four calibration files (one per
//! scan tier) and the JPEG tiles they list. This module locates those files
//! and turns each one into a [`RawLevel`]; it performs no inference.
//!
//! - [`ini`]: the sectioned `key=value` file reader
//! - [`discovery`]: slot names and calibration file lookup
//! - [`calibration`]: header fields and tile entries of one level

pub mod calibration;
pub mod discovery;
pub mod ini;

pub use calibration::{parse_level, LevelHeader, RawLevel, RawTile};
pub use discovery::{
    dataset_dir, has_calibration, locate_all, locate_calibration, tile_path, LevelSlot,
    TILE_EXTENSION,
};
pub use ini::{IniDocument, IniSection};
