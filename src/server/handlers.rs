//! HTTP request handlers for the slide scan API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /slides` - List slide ids
//! - `GET /slides/{slide_id}` - Pyramid metadata
//! - `GET /slides/{slide_id}/thumbnail` - Thumbnail of the coarsest level
//! - `GET /regions/{slide_id}/{level}` - Arbitrary region as JPEG
//! - `GET /tiles/{slide_id}/{level}/{x}/{y}.jpg` - Grid tile as JPEG

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{IoError, OpenError, RegionError};
use crate::slide::SlideSource;
use crate::tile::{
    grid_size, RegionRequest, RegionResponse, RegionService, TileRequest, DEFAULT_JPEG_QUALITY,
    DEFAULT_THUMBNAIL_SIZE,
};

/// Header reporting whether an image came from the region cache.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-cache-hit");

/// Thumbnail sizes are clamped into this range.
pub const THUMBNAIL_SIZE_RANGE: (u32, u32) = (64, 2048);

// =============================================================================
// Application State
// =============================================================================

/// Shared state handed to every handler.
pub struct AppState<S: SlideSource> {
    /// Region service backing all image endpoints
    pub region_service: Arc<RegionService<S>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<S: SlideSource> AppState<S> {
    /// State with a one hour max-age.
    pub fn new(region_service: RegionService<S>) -> Self {
        Self::with_cache_max_age(region_service, 3600)
    }

    /// State with an explicit max-age.
    pub fn with_cache_max_age(region_service: RegionService<S>, cache_max_age: u32) -> Self {
        Self {
            region_service: Arc::new(region_service),
            cache_max_age,
        }
    }
}

impl<S: SlideSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            region_service: Arc::clone(&self.region_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters of `/tiles/{slide_id}/{level}/{x}/{filename}`.
///
/// `filename` is `{y}` or `{y}.jpg`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub slide_id: String,
    pub level: usize,
    pub x: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Grid row, with any `.jpg` suffix stripped.
    pub fn y(&self) -> Result<u32, std::num::ParseIntError> {
        self.filename
            .strip_suffix(".jpg")
            .unwrap_or(&self.filename)
            .parse()
    }
}

/// Query parameters carrying only a JPEG quality.
#[derive(Debug, Deserialize)]
pub struct QualityQueryParams {
    /// JPEG quality (1-100, defaults to 80)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

/// Query parameters of the region endpoint.
#[derive(Debug, Deserialize)]
pub struct RegionQueryParams {
    /// Left edge in level pixels (may be negative)
    pub x: i64,

    /// Top edge in level pixels (may be negative)
    pub y: i64,

    /// Region width in pixels
    pub width: u32,

    /// Region height in pixels
    pub height: u32,

    /// JPEG quality (1-100, defaults to 80)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

/// Query parameters of the slide listing.
#[derive(Debug, Default, Deserialize)]
pub struct SlidesQueryParams {
    /// Case-insensitive substring filter on slide ids
    #[serde(default)]
    pub search: Option<String>,
}

/// Query parameters of the thumbnail endpoint.
#[derive(Debug, Deserialize)]
pub struct ThumbnailQueryParams {
    /// Longest side of the thumbnail (default 512, clamped to 64-2048)
    #[serde(default = "default_thumbnail_size")]
    pub max_size: u32,

    /// JPEG quality (1-100, defaults to 80)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_thumbnail_size() -> u32 {
    DEFAULT_THUMBNAIL_SIZE
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind (e.g. "not_found")
    pub error: String,

    /// Human-readable message
    pub message: String,

    /// HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Slide listing body.
#[derive(Debug, Serialize)]
pub struct SlidesResponse {
    pub slides: Vec<String>,
}

/// Metadata of one exposed level.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    /// Exposed level index (0 = largest)
    pub level: usize,

    /// Scan tier the level came from
    pub slot: String,

    /// Level width in pixels
    pub width: u32,

    /// Level height in pixels
    pub height: u32,

    /// Width of the scanner's tile files
    pub tile_width: u32,

    /// Height of the scanner's tile files
    pub tile_height: u32,

    /// Number of tile files
    pub tile_count: usize,

    /// Stage units per pixel along X
    pub physical_scale_x: f64,

    /// Stage units per pixel along Y
    pub physical_scale_y: f64,

    /// Downsample relative to level 0
    pub downsample: f64,

    /// Grid columns served by the tile endpoint
    pub tiles_x: u32,

    /// Grid rows served by the tile endpoint
    pub tiles_y: u32,
}

/// Pyramid metadata body.
#[derive(Debug, Serialize)]
pub struct SlideMetadataResponse {
    pub slide_id: String,

    /// Width of level 0
    pub width: u32,

    /// Height of level 0
    pub height: u32,

    pub level_count: usize,

    /// Nominal objective magnification
    pub magnification: f64,

    /// Grid tile size of the tile endpoint
    pub tile_size: u32,

    pub levels: Vec<LevelMetadataResponse>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Map a region error to a JSON response.
///
/// 5xx responses are logged at ERROR, 404s at DEBUG, other 4xx at WARN.
impl IntoResponse for RegionError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            RegionError::SlideNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            RegionError::Open(OpenError::Io(IoError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            RegionError::Open(OpenError::NoLevels { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no_levels")
            }
            RegionError::Open(OpenError::Io(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            RegionError::InvalidLevel { .. } => (StatusCode::BAD_REQUEST, "invalid_level"),
            RegionError::InvalidRegion { .. } => (StatusCode::BAD_REQUEST, "invalid_region"),
            RegionError::RegionTooLarge { .. } => (StatusCode::BAD_REQUEST, "region_too_large"),
            RegionError::TileOutOfBounds { .. } => (StatusCode::BAD_REQUEST, "tile_out_of_bounds"),
            RegionError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
            RegionError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
            RegionError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        error_response(status, error_type, self.to_string())
    }
}

/// Listing failures.
pub struct SlidesError(pub IoError);

impl IntoResponse for SlidesError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IoError::NotFound(_) => StatusCode::NOT_FOUND,
            IoError::Read { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error_type = if status == StatusCode::NOT_FOUND {
            "not_found"
        } else {
            "io_error"
        };
        error_response(status, error_type, self.0.to_string())
    }
}

impl From<IoError> for SlidesError {
    fn from(err: IoError) -> Self {
        SlidesError(err)
    }
}

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(error_type, status = status.as_u16(), "Server error: {}", message);
    } else if status == StatusCode::NOT_FOUND {
        debug!(error_type, status = status.as_u16(), "Resource not found: {}", message);
    } else {
        warn!(error_type, status = status.as_u16(), "Client error: {}", message);
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// JPEG response with caching headers.
fn jpeg_response(data: Bytes, cache_hit: bool, cache_max_age: u32) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cache_max_age),
            ),
            (CACHE_HIT_HEADER, cache_hit.to_string()),
        ],
        Body::from(data),
    )
        .into_response()
}

fn image_response(response: RegionResponse, cache_max_age: u32) -> Response {
    jpeg_response(response.data, response.cache_hit, cache_max_age)
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /slides?search=`
pub async fn slides_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<SlidesQueryParams>,
) -> Result<Json<SlidesResponse>, SlidesError> {
    let mut slides = state.region_service.registry().list_slides().await?;

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        slides.retain(|s| s.to_lowercase().contains(&needle));
    }

    Ok(Json(SlidesResponse { slides }))
}

/// `GET /slides/{slide_id}`
pub async fn slide_metadata_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
) -> Result<Json<SlideMetadataResponse>, RegionError> {
    let slide = state.region_service.slide(&slide_id).await?;
    let tile_size = state.region_service.options().tile_size;

    let levels = (0..slide.level_count())
        .filter_map(|level| {
            let info = slide.level_info(level)?;
            let (tiles_x, tiles_y) = grid_size(info.width, info.height, tile_size);
            Some(LevelMetadataResponse {
                level,
                slot: info.slot.name().to_string(),
                width: info.width,
                height: info.height,
                tile_width: info.tile_width,
                tile_height: info.tile_height,
                tile_count: info.tile_count,
                physical_scale_x: info.physical_scale_x,
                physical_scale_y: info.physical_scale_y,
                downsample: info.downsample,
                tiles_x,
                tiles_y,
            })
        })
        .collect();

    let (width, height) = slide.dimensions().unwrap_or((0, 0));
    Ok(Json(SlideMetadataResponse {
        slide_id,
        width,
        height,
        level_count: slide.level_count(),
        magnification: slide.magnification(),
        tile_size,
        levels,
    }))
}

/// `GET /regions/{slide_id}/{level}?x=&y=&width=&height=&quality=`
pub async fn region_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path((slide_id, level)): Path<(String, usize)>,
    Query(query): Query<RegionQueryParams>,
) -> Result<Response, RegionError> {
    let request = RegionRequest::new(
        slide_id,
        level,
        (query.x, query.y),
        (query.width, query.height),
    )
    .with_quality(query.quality);

    let response = state.region_service.get_region(request).await?;
    Ok(image_response(response, state.cache_max_age))
}

/// `GET /tiles/{slide_id}/{level}/{x}/{y}.jpg?quality=`
pub async fn tile_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<QualityQueryParams>,
) -> Result<Response, RegionError> {
    let y = params.y().map_err(|_| RegionError::TileOutOfBounds {
        level: params.level,
        x: params.x,
        y: 0,
        max_x: 0,
        max_y: 0,
    })?;

    let request =
        TileRequest::new(params.slide_id, params.level, params.x, y).with_quality(query.quality);
    let response = state.region_service.get_tile(request).await?;
    Ok(image_response(response, state.cache_max_age))
}

/// `GET /slides/{slide_id}/thumbnail?max_size=&quality=`
pub async fn thumbnail_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<Response, RegionError> {
    let (min, max) = THUMBNAIL_SIZE_RANGE;
    let max_size = query.max_size.clamp(min, max);

    let response = state
        .region_service
        .generate_thumbnail(&slide_id, max_size, query.quality)
        .await?;
    Ok(image_response(response, state.cache_max_age))
}

// =============================================================================
// Tests
// =============================================================================
