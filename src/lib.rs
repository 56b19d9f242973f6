//! # Slide Scan Streamer
//!
//! Reconstructs multi-resolution slide-scanner datasets and serves regions of
//! them as JPEG.
//!
//! A dataset is a directory holding up to four per-tier INI calibration files
//! (`FinalScan`, `FinalCond`, `SlideScan`, `SlideCond`) plus the JPEG tiles
//! each file lists with their stage positions. Opening a dataset calibrates
//! every tier into a level with pixel dimensions, physical scale and a tile
//! index, then aligns the tiers onto a common origin.
//!
//! ## Architecture
//!
//! - [`mod@format`] - calibration file discovery and INI parsing
//! - [`pyramid`] - level calibration, tile index and the [`PyramidModel`]
//! - [`tile`] - tile decoding, region compositing, JPEG encoding and caching
//! - [`slide`] - dataset sources and the registry of opened slides
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use slidescan_streamer::{ImageTileDecoder, PyramidModel, RegionReader};
//!
//! let decoder = Arc::new(ImageTileDecoder::new());
//! let pyramid = PyramidModel::open(Path::new("/data/slide-01"), decoder.as_ref());
//!
//! for level in 0..pyramid.level_count() {
//!     println!("{:?}", pyramid.level_dimensions(level));
//! }
//!
//! let reader = RegionReader::new(decoder);
//! let (rgb, _) = reader.read_region_vec(&pyramid, 0, 0, 0, 512, 512);
//! assert_eq!(rgb.len(), 512 * 512 * 3);
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod pyramid;
pub mod server;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, InfoConfig, RegionConfig, ServeConfig};
pub use error::{DecodeError, IoError, OpenError, RegionError};
pub use format::{IniDocument, LevelSlot};
pub use pyramid::{Level, LevelCalibrator, LevelInfo, PyramidModel, Tile};
pub use server::{
    create_default_router, create_router, health_handler, region_handler, slide_metadata_handler,
    slides_handler, thumbnail_handler, tile_handler, AppState, ErrorResponse, HealthResponse,
    RouterConfig,
};
pub use slide::{LocalSlideSource, SlideRegistry, SlideSource};
pub use tile::{
    DecodedTile, ImageTileDecoder, RegionCache, RegionEncoder, RegionReader, RegionRequest,
    RegionResponse, RegionService, RegionSummary, ServiceOptions, TileDecoder, TileRegion,
    TileRequest, DEFAULT_BACKGROUND, DEFAULT_JPEG_QUALITY,
};
