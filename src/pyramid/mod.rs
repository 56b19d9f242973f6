//! Calibrated pyramid.
//!
//! Raw levels from [`crate::format`] go through [`LevelCalibrator`] to become
//! [`Level`]s with pixel geometry and a sorted tile index; [`PyramidModel`]
//! ties discovery, probing and calibration together for one dataset.

pub mod calibrate;
pub mod index;
pub mod level;
pub mod model;

pub use calibrate::{LevelCalibrator, DEFAULT_STAGE_REF, TIER_MAGNIFICATION_RATIO};
pub use index::{build_tile_index, pixel_origin, IndexGeometry};
pub use level::{Level, StepSize, StepSource, Tile};
pub use model::{LevelInfo, PyramidModel, DEFAULT_MAGNIFICATION, DEFAULT_TILE_SIZE};
