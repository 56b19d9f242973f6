//! Pixel layer: decoding tiles, compositing regions, serving them as JPEG.
//!
//! # Components
//!
//! - [`TileDecoder`]: decodes a sub-rectangle of a tile file into planes
//! - [`RegionReader`]: composites a level region from its tiles
//! - [`RegionEncoder`]: encodes RGB buffers as JPEG
//! - [`RegionCache`]: byte-bounded LRU of encoded regions
//! - [`RegionService`]: validation, caching and blocking-pool reads for the HTTP layer
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use slidescan_streamer::pyramid::PyramidModel;
//! use slidescan_streamer::tile::{ImageTileDecoder, RegionReader};
//!
//! let decoder = Arc::new(ImageTileDecoder::new());
//! let pyramid = PyramidModel::open(Path::new("/data/slide-01"), decoder.as_ref());
//!
//! let reader = RegionReader::new(decoder);
//! let mut rgb = vec![0u8; 256 * 256 * 3];
//! let summary = reader.read_region(&pyramid, 0, 1024, 512, 256, 256, &mut rgb);
//! println!("{} tiles painted", summary.tiles_composited);
//! ```

mod cache;
mod decoder;
mod encoder;
mod region;
mod service;

pub use cache::{
    RegionCache, RegionCacheKey, DEFAULT_REGION_CACHE_CAPACITY, DEFAULT_REGION_CACHE_ENTRIES,
};
pub use decoder::{crop_to_planes, DecodedTile, ImageTileDecoder, TileDecoder, TileRegion};
pub use encoder::{
    clamp_quality, fit_within, is_valid_quality, RegionEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use region::{RegionReader, RegionSummary, BYTES_PER_PIXEL, DEFAULT_BACKGROUND};
pub use service::{
    grid_size, RegionRequest, RegionResponse, RegionService, ServiceOptions, TileRequest,
    DEFAULT_THUMBNAIL_SIZE, DEFAULT_TILE_SIZE, MAX_REGION_SIZE,
};
