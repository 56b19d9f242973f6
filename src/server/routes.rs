//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                    - Health check
//! /slides                                    - List slides
//! /slides/{slide_id}                         - Pyramid metadata
//! /slides/{slide_id}/thumbnail               - Thumbnail
//! /regions/{slide_id}/{level}                - Arbitrary region
//! /tiles/{slide_id}/{level}/{x}/{y}.jpg      - Grid tile
//! ```
//!
//! # Example
//!
//! ```ignore
//! use slidescan_streamer::server::{create_router, RouterConfig};
//!
//! let router = create_router(region_service, RouterConfig::new().with_cache_max_age(600));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, region_handler, slide_metadata_handler, slides_handler, thumbnail_handler,
    tile_handler, AppState,
};
use crate::slide::SlideSource;
use crate::tile::RegionService;

/// Default Cache-Control max-age in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Any CORS origin, one hour max-age, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }

    /// Restrict CORS to the given origins.
    ///
    /// An empty list disallows all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Build the application router.
pub fn create_router<S>(region_service: RegionService<S>, config: RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let app_state = AppState::with_cache_max_age(region_service, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // {filename} captures both "{y}" and "{y}.jpg"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/slides", get(slides_handler::<S>))
        .route("/slides/{slide_id}", get(slide_metadata_handler::<S>))
        .route("/slides/{slide_id}/thumbnail", get(thumbnail_handler::<S>))
        .route("/regions/{slide_id}/{level}", get(region_handler::<S>))
        .route(
            "/tiles/{slide_id}/{level}/{x}/{filename}",
            get(tile_handler::<S>),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Router with default configuration.
pub fn create_default_router<S>(region_service: RegionService<S>) -> Router
where
    S: SlideSource + 'static,
{
    create_router(region_service, RouterConfig::new())
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
