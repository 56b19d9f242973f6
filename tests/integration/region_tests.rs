//! Region compositing tests.
//!
//! Tests verify:
//! - Tiles land at their pixel origins with correct colours
//! - Sub-rectangles crop tiles at the right offsets
//! - Overlapping tiles paint in index order (last write wins)
//! - Out-of-bounds, invalid-level and invalid-pyramid reads give background
//! - Unreadable tiles are skipped
//! - The image-crate decoder on real JPEG files

use std::sync::Arc;

use image::{Rgb, RgbImage};
use slidescan_streamer::pyramid::PyramidModel;
use slidescan_streamer::slide::{LocalSlideSource, SlideRegistry};
use slidescan_streamer::tile::{
    ImageTileDecoder, RegionReader, RegionRequest, RegionService, RegionSummary, TileDecoder,
    DEFAULT_BACKGROUND,
};
use tempfile::TempDir;

use super::test_utils::{
    coordinate_rgb, pixel_at, quad_dataset, solid_gray, solid_rgb, DatasetBuilder,
    MockTileDecoder, QUAD_BOTTOM_LEFT, QUAD_BOTTOM_RIGHT, QUAD_TOP_LEFT, QUAD_TOP_RIGHT,
    SMALL_HEADER,
};

const BG: [u8; 3] = [DEFAULT_BACKGROUND; 3];

fn quad() -> (TempDir, Arc<MockTileDecoder>, PyramidModel) {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    let dataset = quad_dataset(root.path().join("quad"), &decoder);
    let pyramid = PyramidModel::open(dataset.dir(), decoder.as_ref());
    (root, decoder, pyramid)
}

// =============================================================================
// Placement
// =============================================================================

#[test]
fn test_full_extent_mosaic() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder);

    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, 0, 0, 8, 8);

    assert_eq!(
        summary,
        RegionSummary {
            tiles_composited: 4,
            tiles_failed: 0
        }
    );
    for (x, y, expected) in [
        (0, 0, QUAD_TOP_LEFT),
        (3, 3, QUAD_TOP_LEFT),
        (4, 0, QUAD_TOP_RIGHT),
        (7, 3, QUAD_TOP_RIGHT),
        (0, 4, QUAD_BOTTOM_LEFT),
        (3, 7, QUAD_BOTTOM_LEFT),
        (4, 4, QUAD_BOTTOM_RIGHT),
        (7, 7, QUAD_BOTTOM_RIGHT),
    ] {
        assert_eq!(pixel_at(&rgb, 8, x, y), expected, "pixel ({}, {})", x, y);
    }
}

#[test]
fn test_sub_rectangle_crops_tile() {
    let (_root, decoder, pyramid) = quad();
    let tile = pyramid.level(0).unwrap().tiles[3].path.clone();
    decoder.insert(tile, coordinate_rgb(4, 4, 99));
    let reader = RegionReader::new(decoder);

    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, 5, 6, 2, 1);

    assert_eq!(summary.tiles_composited, 1);
    assert_eq!(pixel_at(&rgb, 2, 0, 0), [1, 2, 99]);
    assert_eq!(pixel_at(&rgb, 2, 1, 0), [2, 2, 99]);
}

#[test]
fn test_region_spanning_all_tiles_at_center() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder);

    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, 3, 3, 2, 2);

    assert_eq!(summary.tiles_composited, 4);
    assert_eq!(pixel_at(&rgb, 2, 0, 0), QUAD_TOP_LEFT);
    assert_eq!(pixel_at(&rgb, 2, 1, 0), QUAD_TOP_RIGHT);
    assert_eq!(pixel_at(&rgb, 2, 0, 1), QUAD_BOTTOM_LEFT);
    assert_eq!(pixel_at(&rgb, 2, 1, 1), QUAD_BOTTOM_RIGHT);
}

#[test]
fn test_file_order_does_not_affect_disjoint_tiles() {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    let dataset = DatasetBuilder::new(root.path().join("shuffled")).level(
        "FinalScan.ini",
        SMALL_HEADER,
        &[
            ("Da3", 0, 0),
            ("Da1", 0, 40),
            ("Da2", 40, 0),
            ("Da0", 40, 40),
        ],
    );
    decoder.insert(dataset.tile_path("Da0"), solid_rgb(4, 4, QUAD_TOP_LEFT));
    decoder.insert(dataset.tile_path("Da1"), solid_rgb(4, 4, QUAD_TOP_RIGHT));
    decoder.insert(dataset.tile_path("Da2"), solid_rgb(4, 4, QUAD_BOTTOM_LEFT));
    decoder.insert(dataset.tile_path("Da3"), solid_rgb(4, 4, QUAD_BOTTOM_RIGHT));

    let pyramid = PyramidModel::open(dataset.dir(), decoder.as_ref());
    let (rgb, _) = RegionReader::new(decoder).read_region_vec(&pyramid, 0, 0, 0, 8, 8);

    assert_eq!(pixel_at(&rgb, 8, 0, 0), QUAD_TOP_LEFT);
    assert_eq!(pixel_at(&rgb, 8, 7, 7), QUAD_BOTTOM_RIGHT);
}

// =============================================================================
// Overlap
// =============================================================================

#[test]
fn test_coincident_tiles_last_listed_wins() {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    let dataset = DatasetBuilder::new(root.path().join("coincident")).level(
        "FinalScan.ini",
        SMALL_HEADER,
        &[("First", 0, 0), ("Second", 0, 0)],
    );
    decoder.insert(dataset.tile_path("First"), solid_rgb(4, 4, [1, 1, 1]));
    decoder.insert(dataset.tile_path("Second"), solid_rgb(4, 4, [2, 2, 2]));

    let pyramid = PyramidModel::open(dataset.dir(), decoder.as_ref());
    let (rgb, summary) = RegionReader::new(decoder).read_region_vec(&pyramid, 0, 0, 0, 4, 4);

    assert_eq!(summary.tiles_composited, 2);
    assert_eq!(pixel_at(&rgb, 4, 2, 2), [2, 2, 2]);
}

#[test]
fn test_partial_overlap_later_origin_wins() {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    // Pixel origins: Left at x=0, Right at x=2
    let dataset = DatasetBuilder::new(root.path().join("overlap")).level(
        "FinalScan.ini",
        SMALL_HEADER,
        &[("Right", 20, 0), ("Left", 40, 0)],
    );
    decoder.insert(dataset.tile_path("Left"), solid_rgb(4, 4, [10, 10, 10]));
    decoder.insert(dataset.tile_path("Right"), solid_rgb(4, 4, [20, 20, 20]));

    let pyramid = PyramidModel::open(dataset.dir(), decoder.as_ref());
    assert_eq!(pyramid.dimensions(), Some((6, 4)));

    let (rgb, _) = RegionReader::new(decoder).read_region_vec(&pyramid, 0, 0, 0, 6, 4);

    assert_eq!(pixel_at(&rgb, 6, 1, 0), [10, 10, 10]);
    assert_eq!(pixel_at(&rgb, 6, 2, 0), [20, 20, 20]);
    assert_eq!(pixel_at(&rgb, 6, 3, 0), [20, 20, 20]);
    assert_eq!(pixel_at(&rgb, 6, 5, 3), [20, 20, 20]);
}

// =============================================================================
// Clipping and Background
// =============================================================================

#[test]
fn test_partially_outside_region() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder);

    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, -2, -2, 4, 4);

    assert_eq!(summary.tiles_composited, 1);
    assert_eq!(pixel_at(&rgb, 4, 0, 0), BG);
    assert_eq!(pixel_at(&rgb, 4, 1, 3), BG);
    assert_eq!(pixel_at(&rgb, 4, 2, 2), QUAD_TOP_LEFT);
    assert_eq!(pixel_at(&rgb, 4, 3, 3), QUAD_TOP_LEFT);

    let (rgb, _) = reader.read_region_vec(&pyramid, 0, 6, 6, 4, 4);
    assert_eq!(pixel_at(&rgb, 4, 0, 0), QUAD_BOTTOM_RIGHT);
    assert_eq!(pixel_at(&rgb, 4, 1, 1), QUAD_BOTTOM_RIGHT);
    assert_eq!(pixel_at(&rgb, 4, 2, 2), BG);
}

/// FinalScan tiles aligned under a SlideScan tier.
///
/// The 32x32 FinalScan extent is derived from SlideScan, and alignment puts
/// its tiles at pixel x 30 and 34, y 18 and 22, so the right column of tiles
/// lies past the level's width.
fn aligned_overhang() -> (TempDir, Arc<MockTileDecoder>, PyramidModel) {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    let dataset = DatasetBuilder::new(root.path().join("overhang"))
        .level(
            "FinalScan.ini",
            SMALL_HEADER,
            &[
                ("Fs0", -80, 40),
                ("Fs1", -120, 40),
                ("Fs2", -80, 0),
                ("Fs3", -120, 0),
            ],
        )
        .level(
            "SlideScan.ini",
            &[
                ("iImageWidth", 4),
                ("iImageHeight", 4),
                ("lXStepSize", 160),
                ("lYStepSize", 160),
            ],
            &[
                ("Sc0", 0, 0),
                ("Sc1", 160, 0),
                ("Sc2", 0, 160),
                ("Sc3", 160, 160),
            ],
        );
    for name in ["Fs0", "Fs1", "Fs2", "Fs3"] {
        decoder.insert(dataset.tile_path(name), solid_rgb(4, 4, [1, 2, 3]));
    }
    for name in ["Sc0", "Sc1", "Sc2", "Sc3"] {
        decoder.insert(dataset.tile_path(name), solid_rgb(4, 4, [9, 9, 9]));
    }

    let pyramid = PyramidModel::open(dataset.dir(), decoder.as_ref());
    (root, decoder, pyramid)
}

#[test]
fn test_tiles_past_level_extent_are_clipped() {
    let (_root, decoder, pyramid) = aligned_overhang();
    let level = pyramid.level(0).unwrap();
    assert_eq!((level.total_width, level.total_height), (32, 32));
    let origins: Vec<_> = level.tiles.iter().map(|t| (t.x_pixel, t.y_pixel)).collect();
    assert_eq!(origins, vec![(30, 18), (34, 18), (30, 22), (34, 22)]);

    let reader = RegionReader::new(decoder);
    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, 27, 18, 20, 1);

    assert_eq!(summary.tiles_composited, 1);
    for column in 0..20u32 {
        let level_x = 27 + column;
        let expected = if (30..32).contains(&level_x) { [1, 2, 3] } else { BG };
        assert_eq!(pixel_at(&rgb, 20, column, 0), expected, "level column {}", level_x);
    }
}

#[test]
fn test_entirely_outside_region() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder.clone());

    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, 100, 100, 4, 4);

    assert_eq!(summary, RegionSummary::default());
    assert!(rgb.iter().all(|&b| b == DEFAULT_BACKGROUND));
    assert_eq!(decoder.decode_count(), 0);
}

#[test]
fn test_invalid_level_is_background() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder).with_background(0x20);

    let (rgb, summary) = reader.read_region_vec(&pyramid, 5, 0, 0, 4, 4);

    assert_eq!(summary, RegionSummary::default());
    assert!(rgb.iter().all(|&b| b == 0x20));
}

#[test]
fn test_invalid_pyramid_is_background() {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    let pyramid = PyramidModel::open(root.path(), decoder.as_ref());
    let reader = RegionReader::new(decoder).with_background(0x10);

    let mut dest = vec![0u8; 3 * 3 * 3];
    reader.read_region(&pyramid, 0, 0, 0, 3, 3, &mut dest);

    assert!(dest.iter().all(|&b| b == 0x10));
}

#[test]
fn test_zero_size_and_short_buffer_leave_destination_untouched() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder);

    let mut dest = vec![7u8; 12];
    reader.read_region(&pyramid, 0, 0, 0, 0, 4, &mut dest);
    assert!(dest.iter().all(|&b| b == 7));

    let mut dest = vec![7u8; 5];
    reader.read_region(&pyramid, 0, 0, 0, 2, 2, &mut dest);
    assert!(dest.iter().all(|&b| b == 7));
}

#[test]
fn test_only_region_bytes_are_written() {
    let (_root, decoder, pyramid) = quad();
    let reader = RegionReader::new(decoder);

    let mut dest = vec![7u8; 2 * 2 * 3 + 6];
    reader.read_region(&pyramid, 0, 0, 0, 2, 2, &mut dest);

    assert_eq!(&dest[..3], &QUAD_TOP_LEFT);
    assert!(dest[12..].iter().all(|&b| b == 7));
}

// =============================================================================
// Channels and Failures
// =============================================================================

#[test]
fn test_grayscale_tile_matches_equivalent_rgb() {
    let (_root, decoder, pyramid) = quad();
    let paths: Vec<_> = pyramid.level(0).unwrap().tiles.iter().map(|t| t.path.clone()).collect();
    decoder.insert(paths[0].clone(), solid_gray(4, 4, 77));
    decoder.insert(paths[1].clone(), solid_rgb(4, 4, [77, 77, 77]));
    let reader = RegionReader::new(decoder);

    let (rgb, _) = reader.read_region_vec(&pyramid, 0, 0, 0, 8, 4);

    assert_eq!(pixel_at(&rgb, 8, 1, 1), [77, 77, 77]);
    assert_eq!(pixel_at(&rgb, 8, 1, 1), pixel_at(&rgb, 8, 5, 1));
}

#[test]
fn test_unreadable_tile_is_skipped() {
    let (_root, decoder, pyramid) = quad();
    decoder.fail_decode(pyramid.level(0).unwrap().tiles[0].path.clone());
    let reader = RegionReader::new(decoder);

    let (rgb, summary) = reader.read_region_vec(&pyramid, 0, 0, 0, 8, 8);

    assert_eq!(summary.tiles_composited, 3);
    assert_eq!(summary.tiles_failed, 1);
    assert_eq!(pixel_at(&rgb, 8, 0, 0), BG);
    assert_eq!(pixel_at(&rgb, 8, 4, 0), QUAD_TOP_RIGHT);
}

// =============================================================================
// Real JPEG Tiles
// =============================================================================

#[test]
fn test_image_decoder_end_to_end() {
    let root = TempDir::new().unwrap();
    let dataset = DatasetBuilder::new(root.path().join("jpeg")).level(
        "FinalScan.ini",
        &[("lXStepSize", 160), ("lYStepSize", 160)],
        &[("Da0", 160, 0), ("Da1", 0, 0)],
    );
    RgbImage::from_pixel(16, 16, Rgb([200, 40, 40]))
        .save(dataset.tile_path("Da0"))
        .unwrap();
    RgbImage::from_pixel(16, 16, Rgb([40, 40, 200]))
        .save(dataset.tile_path("Da1"))
        .unwrap();

    let decoder: Arc<dyn TileDecoder> = Arc::new(ImageTileDecoder::new());
    let pyramid = PyramidModel::try_open(dataset.dir(), decoder.as_ref()).unwrap();
    assert_eq!(pyramid.optimal_tile_size(), (16, 16));
    assert_eq!(pyramid.dimensions(), Some((32, 16)));

    let (rgb, summary) = RegionReader::new(decoder).read_region_vec(&pyramid, 0, 0, 0, 32, 16);
    assert_eq!(summary.tiles_composited, 2);

    let close = |actual: [u8; 3], expected: [u8; 3]| {
        actual
            .iter()
            .zip(expected)
            .all(|(a, e)| (*a as i16 - e as i16).abs() <= 8)
    };
    assert!(close(pixel_at(&rgb, 32, 8, 8), [200, 40, 40]));
    assert!(close(pixel_at(&rgb, 32, 24, 8), [40, 40, 200]));
}

// =============================================================================
// Region Service
// =============================================================================

#[tokio::test]
async fn test_service_caches_and_invalidates() {
    let root = TempDir::new().unwrap();
    let decoder = Arc::new(MockTileDecoder::new());
    quad_dataset(root.path().join("quad"), &decoder);

    let source = LocalSlideSource::new(root.path(), decoder.clone());
    let service = RegionService::new(SlideRegistry::new(source), RegionReader::new(decoder.clone()));

    let request = RegionRequest::new("quad", 0, (0, 0), (8, 8));
    let first = service.get_region(request.clone()).await.unwrap();
    let decodes = decoder.decode_count();
    let second = service.get_region(request.clone()).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.data, second.data);
    assert_eq!(decoder.decode_count(), decodes);

    let (_, _, entries) = service.cache_stats().await;
    assert_eq!(entries, 1);

    service.invalidate_slide("quad").await;
    let (_, _, entries) = service.cache_stats().await;
    assert_eq!(entries, 0);
    assert_eq!(service.registry().cached_count().await, 0);

    let third = service.get_region(request).await.unwrap();
    assert!(!third.cache_hit);
}
