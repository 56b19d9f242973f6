//! API integration tests.
//!
//! Tests verify:
//! - Health, slide listing and metadata endpoints
//! - Region, grid tile and thumbnail retrieval
//! - Error cases (missing slide, unusable dataset, invalid parameters)
//! - HTTP response codes and headers

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use slidescan_streamer::slide::{LocalSlideSource, SlideRegistry};
use slidescan_streamer::tile::{RegionReader, RegionService};
use slidescan_streamer::{create_router, RouterConfig};

use super::test_utils::{is_valid_jpeg, quad_dataset, DatasetBuilder, MockTileDecoder};

// =============================================================================
// Setup
// =============================================================================

/// Root with two 8x8 datasets, one unusable dataset and one plain directory.
fn test_router() -> (TempDir, Router) {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());

    quad_dataset(root.path().join("alpha"), &decoder);
    quad_dataset(root.path().join("beta"), &decoder);
    DatasetBuilder::new(root.path().join("broken")).raw_file("FinalScan.ini", "not a header\n");
    std::fs::create_dir(root.path().join("notes")).unwrap();

    let source = LocalSlideSource::new(root.path(), decoder.clone());
    let service = RegionService::new(SlideRegistry::new(source), RegionReader::new(decoder));
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    (root, router)
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn assert_error(router: &Router, uri: &str, status: StatusCode, error: &str) {
    let response = get(router, uri).await;
    assert_eq!(response.status(), status, "{}", uri);

    let json = json_body(response).await;
    assert_eq!(json["error"], error, "{}", uri);
    assert_eq!(json["status"], status.as_u16(), "{}", uri);
    assert!(json["message"].is_string());
}

// =============================================================================
// Health and Listing
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (_root, router) = test_router();

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_slides_listing() {
    let (_root, router) = test_router();

    let json = json_body(get(&router, "/slides").await).await;
    assert_eq!(json["slides"], serde_json::json!(["alpha", "beta", "broken"]));
}

#[tokio::test]
async fn test_slides_search_is_case_insensitive() {
    let (_root, router) = test_router();

    let json = json_body(get(&router, "/slides?search=AL").await).await;
    assert_eq!(json["slides"], serde_json::json!(["alpha"]));

    let json = json_body(get(&router, "/slides?search=zzz").await).await;
    assert_eq!(json["slides"], serde_json::json!([]));
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_slide_metadata() {
    let (_root, router) = test_router();

    let response = get(&router, "/slides/alpha").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["slide_id"], "alpha");
    assert_eq!(json["width"], 8);
    assert_eq!(json["height"], 8);
    assert_eq!(json["level_count"], 1);
    assert_eq!(json["magnification"], 40.0);
    assert_eq!(json["tile_size"], 512);

    let level = &json["levels"][0];
    assert_eq!(level["level"], 0);
    assert_eq!(level["slot"], "FinalScan");
    assert_eq!(level["tile_width"], 4);
    assert_eq!(level["tile_count"], 4);
    assert_eq!(level["downsample"], 1.0);
    assert_eq!(level["tiles_x"], 1);
    assert_eq!(level["tiles_y"], 1);
}

#[tokio::test]
async fn test_metadata_errors() {
    let (_root, router) = test_router();

    assert_error(&router, "/slides/missing", StatusCode::NOT_FOUND, "not_found").await;
    assert_error(&router, "/slides/notes", StatusCode::NOT_FOUND, "not_found").await;
    assert_error(&router, "/slides/..", StatusCode::NOT_FOUND, "not_found").await;
    assert_error(
        &router,
        "/slides/broken",
        StatusCode::UNPROCESSABLE_ENTITY,
        "no_levels",
    )
    .await;
}

// =============================================================================
// Regions
// =============================================================================

#[tokio::test]
async fn test_region_retrieval() {
    let (_root, router) = test_router();

    let response = get(&router, "/regions/alpha/0?x=0&y=0&width=8&height=8").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.headers()["cache-control"], "public, max-age=3600");
    assert_eq!(response.headers()["x-cache-hit"], "false");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_jpeg(&body));

    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
}

#[tokio::test]
async fn test_region_cache_hit_header() {
    let (_root, router) = test_router();
    let uri = "/regions/beta/0?x=2&y=2&width=4&height=4&quality=70";

    let first = get(&router, uri).await;
    assert_eq!(first.headers()["x-cache-hit"], "false");

    let second = get(&router, uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache-hit"], "true");
}

#[tokio::test]
async fn test_region_with_negative_origin() {
    let (_root, router) = test_router();

    let response = get(&router, "/regions/alpha/0?x=-4&y=-4&width=8&height=8").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_region_errors() {
    let (_root, router) = test_router();

    assert_error(
        &router,
        "/regions/missing/0?x=0&y=0&width=8&height=8",
        StatusCode::NOT_FOUND,
        "not_found",
    )
    .await;
    assert_error(
        &router,
        "/regions/alpha/3?x=0&y=0&width=8&height=8",
        StatusCode::BAD_REQUEST,
        "invalid_level",
    )
    .await;
    assert_error(
        &router,
        "/regions/alpha/0?x=0&y=0&width=0&height=8",
        StatusCode::BAD_REQUEST,
        "invalid_region",
    )
    .await;
    assert_error(
        &router,
        "/regions/alpha/0?x=0&y=0&width=5000&height=8",
        StatusCode::BAD_REQUEST,
        "region_too_large",
    )
    .await;
    assert_error(
        &router,
        "/regions/alpha/0?x=0&y=0&width=8&height=8&quality=0",
        StatusCode::BAD_REQUEST,
        "invalid_quality",
    )
    .await;
}

#[tokio::test]
async fn test_region_missing_parameters() {
    let (_root, router) = test_router();

    let response = get(&router, "/regions/alpha/0?width=8&height=8").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Grid Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval() {
    let (_root, router) = test_router();

    for uri in ["/tiles/alpha/0/0/0.jpg", "/tiles/alpha/0/0/0"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(response.headers()["content-type"], "image/jpeg");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let decoded = image::load_from_memory(&body).unwrap();
        // Edge tile clipped to the 8x8 level
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }
}

#[tokio::test]
async fn test_tile_errors() {
    let (_root, router) = test_router();

    assert_error(
        &router,
        "/tiles/alpha/0/1/0.jpg",
        StatusCode::BAD_REQUEST,
        "tile_out_of_bounds",
    )
    .await;
    assert_error(
        &router,
        "/tiles/alpha/0/0/abc.jpg",
        StatusCode::BAD_REQUEST,
        "tile_out_of_bounds",
    )
    .await;
    assert_error(
        &router,
        "/tiles/alpha/2/0/0.jpg",
        StatusCode::BAD_REQUEST,
        "invalid_level",
    )
    .await;
    assert_error(
        &router,
        "/tiles/alpha/0/0/0.jpg?quality=101",
        StatusCode::BAD_REQUEST,
        "invalid_quality",
    )
    .await;
}

// =============================================================================
// Thumbnails
// =============================================================================

#[tokio::test]
async fn test_thumbnail() {
    let (_root, router) = test_router();

    let response = get(&router, "/slides/alpha/thumbnail").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
}

#[tokio::test]
async fn test_thumbnail_missing_slide() {
    let (_root, router) = test_router();

    assert_error(
        &router,
        "/slides/missing/thumbnail?max_size=128",
        StatusCode::NOT_FOUND,
        "not_found",
    )
    .await;
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_any_origin() {
    let (_root, router) = test_router();

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://viewer.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_cors_preflight_allows_only_content_type() {
    let (_root, router) = test_router();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/slides")
        .header("origin", "https://viewer.example.com")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "authorization")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    let allowed = response.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("content-type"));
    assert!(!allowed.contains("authorization"));
}
