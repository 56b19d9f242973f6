//! Region service: validated, cached, JPEG-encoded region reads.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RegionService                            │
//! │  1. Validate request     4. Composite region (blocking pool)    │
//! │  2. Check cache          5. Encode JPEG                         │
//! │  3. Get slide            6. Cache & return                      │
//! │        │                        │                    │          │
//! │        ▼                        ▼                    ▼          │
//! │  ┌─────────────┐        ┌──────────────┐     ┌───────────────┐  │
//! │  │ RegionCache │        │ RegionReader │     │ RegionEncoder │  │
//! │  └─────────────┘        └──────────────┘     └───────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Grid tiles are fixed-size regions aligned to a `tile_size` grid over a
//! level; edge tiles are clipped to the level.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::{IoError, OpenError, RegionError};
use crate::pyramid::PyramidModel;
use crate::slide::{SlideRegistry, SlideSource};

use super::cache::{RegionCache, RegionCacheKey, DEFAULT_REGION_CACHE_CAPACITY};
use super::encoder::{is_valid_quality, RegionEncoder, DEFAULT_JPEG_QUALITY};
use super::region::RegionReader;

/// Default grid tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Largest region side served per request.
pub const MAX_REGION_SIZE: u32 = 4096;

/// Default longest side of a thumbnail.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

// =============================================================================
// Requests and Responses
// =============================================================================

/// A pixel region of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRequest {
    /// Slide identifier
    pub slide_id: String,

    /// Exposed level (0 = largest)
    pub level: usize,

    /// Left edge in level pixels
    pub x: i64,

    /// Top edge in level pixels
    pub y: i64,

    /// Region width
    pub width: u32,

    /// Region height
    pub height: u32,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl RegionRequest {
    /// Request with the default quality.
    pub fn new(
        slide_id: impl Into<String>,
        level: usize,
        (x, y): (i64, i64),
        (width, height): (u32, u32),
    ) -> Self {
        Self {
            slide_id: slide_id.into(),
            level,
            x,
            y,
            width,
            height,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Override the JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }
}

/// A grid tile of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Slide identifier
    pub slide_id: String,

    /// Exposed level (0 = largest)
    pub level: usize,

    /// Grid column
    pub tile_x: u32,

    /// Grid row
    pub tile_y: u32,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl TileRequest {
    /// Request with the default quality.
    pub fn new(slide_id: impl Into<String>, level: usize, tile_x: u32, tile_y: u32) -> Self {
        Self {
            slide_id: slide_id.into(),
            level,
            tile_x,
            tile_y,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Override the JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }
}

/// An encoded image.
#[derive(Debug, Clone)]
pub struct RegionResponse {
    /// JPEG bytes
    pub data: Bytes,

    /// Whether the bytes came from the cache
    pub cache_hit: bool,

    /// Quality used for encoding
    pub quality: u8,
}

// =============================================================================
// Options
// =============================================================================

/// Tunables of a [`RegionService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Byte budget of the encoded region cache
    pub cache_capacity: usize,

    /// Grid tile size for [`RegionService::get_tile`]
    pub tile_size: u32,

    /// Largest region side accepted
    pub max_region_size: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_REGION_CACHE_CAPACITY,
            tile_size: DEFAULT_TILE_SIZE,
            max_region_size: MAX_REGION_SIZE,
        }
    }
}

// =============================================================================
// RegionService
// =============================================================================

/// Serves encoded regions, grid tiles and thumbnails of registry slides.
pub struct RegionService<S: SlideSource> {
    registry: Arc<SlideRegistry<S>>,
    reader: RegionReader,
    cache: RegionCache,
    encoder: RegionEncoder,
    options: ServiceOptions,
}

impl<S: SlideSource> RegionService<S> {
    /// Service with default options.
    pub fn new(registry: SlideRegistry<S>, reader: RegionReader) -> Self {
        Self::with_options(Arc::new(registry), reader, ServiceOptions::default())
    }

    /// Service sharing a registry, with explicit options.
    pub fn with_options(
        registry: Arc<SlideRegistry<S>>,
        reader: RegionReader,
        options: ServiceOptions,
    ) -> Self {
        Self {
            registry,
            reader,
            cache: RegionCache::with_capacity(options.cache_capacity),
            encoder: RegionEncoder::new(),
            options,
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// The slide registry.
    pub fn registry(&self) -> &Arc<SlideRegistry<S>> {
        &self.registry
    }

    /// Open (or fetch) a slide, mapping unknown ids to `SlideNotFound`.
    pub async fn slide(&self, slide_id: &str) -> Result<Arc<PyramidModel>, RegionError> {
        self.registry
            .get_slide(slide_id)
            .await
            .map_err(|e| match e {
                OpenError::Io(IoError::NotFound(_)) => RegionError::SlideNotFound {
                    slide_id: slide_id.to_string(),
                },
                other => RegionError::Open(other),
            })
    }

    /// Read, encode and cache one region.
    pub async fn get_region(&self, request: RegionRequest) -> Result<RegionResponse, RegionError> {
        self.validate(&request)?;

        let key = RegionCacheKey::new(
            request.slide_id.as_str(),
            request.level,
            (request.x, request.y),
            (request.width, request.height),
            request.quality,
        );
        if let Some(data) = self.cache.get(&key).await {
            return Ok(RegionResponse {
                data,
                cache_hit: true,
                quality: request.quality,
            });
        }

        let slide = self.slide(&request.slide_id).await?;
        check_level(&slide, request.level)?;

        let data = self.render(slide, &request).await?;
        self.cache.put(key, data.clone()).await;

        Ok(RegionResponse {
            data,
            cache_hit: false,
            quality: request.quality,
        })
    }

    /// Serve one cell of the `tile_size` grid over a level.
    pub async fn get_tile(&self, request: TileRequest) -> Result<RegionResponse, RegionError> {
        if !is_valid_quality(request.quality) {
            return Err(RegionError::InvalidQuality {
                quality: request.quality,
            });
        }

        let slide = self.slide(&request.slide_id).await?;
        check_level(&slide, request.level)?;

        let (width, height) = slide
            .level_dimensions(request.level)
            .ok_or(RegionError::InvalidLevel {
                level: request.level,
                max_levels: slide.level_count(),
            })?;
        let tile_size = self.options.tile_size;
        let (max_x, max_y) = grid_size(width, height, tile_size);
        if request.tile_x >= max_x || request.tile_y >= max_y {
            return Err(RegionError::TileOutOfBounds {
                level: request.level,
                x: request.tile_x,
                y: request.tile_y,
                max_x,
                max_y,
            });
        }

        let x = request.tile_x as u64 * tile_size as u64;
        let y = request.tile_y as u64 * tile_size as u64;
        let tile_width = (width as u64 - x).min(tile_size as u64) as u32;
        let tile_height = (height as u64 - y).min(tile_size as u64) as u32;

        self.get_region(
            RegionRequest::new(
                request.slide_id,
                request.level,
                (x as i64, y as i64),
                (tile_width, tile_height),
            )
            .with_quality(request.quality),
        )
        .await
    }

    /// Whole coarsest level, downscaled so its longest side is at most `max_size`.
    pub async fn generate_thumbnail(
        &self,
        slide_id: &str,
        max_size: u32,
        quality: u8,
    ) -> Result<RegionResponse, RegionError> {
        if !is_valid_quality(quality) {
            return Err(RegionError::InvalidQuality { quality });
        }
        if max_size == 0 {
            return Err(RegionError::InvalidRegion {
                width: max_size,
                height: max_size,
            });
        }

        let slide = self.slide(slide_id).await?;
        let level = slide.coarsest_level().ok_or(RegionError::InvalidLevel {
            level: 0,
            max_levels: 0,
        })?;
        let (width, height) = slide
            .level_dimensions(level)
            .ok_or(RegionError::InvalidLevel {
                level,
                max_levels: slide.level_count(),
            })?;
        let limit = self.options.max_region_size;
        if width > limit || height > limit {
            return Err(RegionError::RegionTooLarge {
                width,
                height,
                max: limit,
            });
        }

        let reader = self.reader.clone();
        let encoder = self.encoder.clone();
        let data = tokio::task::spawn_blocking(move || {
            let (pixels, _) = reader.read_region_vec(&slide, level, 0, 0, width, height);
            encoder.encode_rgb_fitted(pixels, width, height, max_size, quality)
        })
        .await
        .map_err(|e| RegionError::Internal {
            message: e.to_string(),
        })??;

        Ok(RegionResponse {
            data,
            cache_hit: false,
            quality,
        })
    }

    /// Cache statistics as `(bytes, capacity, entries)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        (
            self.cache.size().await,
            self.cache.capacity(),
            self.cache.len().await,
        )
    }

    /// Empty the region cache.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Forget a slide: cached regions and the opened pyramid.
    pub async fn invalidate_slide(&self, slide_id: &str) {
        let dropped = self.cache.invalidate_slide(slide_id).await;
        self.registry.invalidate(slide_id).await;
        debug!(slide_id, dropped, "Invalidated slide");
    }

    fn validate(&self, request: &RegionRequest) -> Result<(), RegionError> {
        if !is_valid_quality(request.quality) {
            return Err(RegionError::InvalidQuality {
                quality: request.quality,
            });
        }
        if request.width == 0 || request.height == 0 {
            return Err(RegionError::InvalidRegion {
                width: request.width,
                height: request.height,
            });
        }
        let max = self.options.max_region_size;
        if request.width > max || request.height > max {
            return Err(RegionError::RegionTooLarge {
                width: request.width,
                height: request.height,
                max,
            });
        }
        Ok(())
    }

    async fn render(
        &self,
        slide: Arc<PyramidModel>,
        request: &RegionRequest,
    ) -> Result<Bytes, RegionError> {
        let reader = self.reader.clone();
        let encoder = self.encoder.clone();
        let RegionRequest {
            level,
            x,
            y,
            width,
            height,
            quality,
            ..
        } = *request;

        tokio::task::spawn_blocking(move || {
            let (pixels, summary) = reader.read_region_vec(&slide, level, x, y, width, height);
            debug!(
                level,
                composited = summary.tiles_composited,
                failed = summary.tiles_failed,
                "Composited region"
            );
            encoder.encode_rgb(pixels, width, height, quality)
        })
        .await
        .map_err(|e| RegionError::Internal {
            message: e.to_string(),
        })?
    }
}

fn check_level(slide: &PyramidModel, level: usize) -> Result<(), RegionError> {
    if level >= slide.level_count() {
        return Err(RegionError::InvalidLevel {
            level,
            max_levels: slide.level_count(),
        });
    }
    Ok(())
}

/// Number of grid columns and rows covering a level.
pub fn grid_size(width: u32, height: u32, tile_size: u32) -> (u32, u32) {
    if tile_size == 0 {
        return (0, 0);
    }
    (width.div_ceil(tile_size), height.div_ceil(tile_size))
}

// =============================================================================
// Tests
// =============================================================================
