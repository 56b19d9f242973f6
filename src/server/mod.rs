//! HTTP server layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   /slides  /regions/{slide_id}/{level}  /tiles/.../{y}.jpg      │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────┐ │
//! │  │        handlers          │  │           routes             │ │
//! │  │ (extractors, responses)  │  │ (router, CORS, tracing)      │ │
//! │  └──────────────────────────┘  └──────────────────────────────┘ │
//! └────────────────────────────────┬────────────────────────────────┘
//!                                  ▼
//!                            RegionService
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, region_handler, slide_metadata_handler, slides_handler, thumbnail_handler,
    tile_handler, AppState, ErrorResponse, HealthResponse, LevelMetadataResponse,
    QualityQueryParams, RegionQueryParams, SlideMetadataResponse, SlidesError, SlidesQueryParams,
    SlidesResponse, ThumbnailQueryParams, TilePathParams, CACHE_HIT_HEADER,
};
pub use routes::{create_default_router, create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE};
