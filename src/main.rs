//! Slide Scan Streamer - serves multi-level slide scanner datasets.
//!
//! This binary starts the HTTP server or runs one-off dataset commands.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slidescan_streamer::{
    config::{Cli, Command, InfoConfig, RegionConfig, ServeConfig},
    pyramid::{LevelInfo, PyramidModel},
    server::{create_router, RouterConfig},
    slide::{LocalSlideSource, SlideRegistry, SlideSource},
    tile::{ImageTileDecoder, RegionEncoder, RegionReader, RegionService, TileDecoder},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Info(config) => run_info(config),
        Command::Region(config) => run_region(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("slidescan-streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Root: {}", config.root.display());
    info!(
        "  Cache: {} slides, {}MB regions",
        config.cache_slides,
        config.cache_regions / (1024 * 1024)
    );
    info!(
        "  Tiles: {}px grid, regions up to {}px",
        config.tile_size, config.max_region_size
    );

    let decoder: Arc<dyn TileDecoder> = Arc::new(ImageTileDecoder::new());
    let source = LocalSlideSource::new(config.root.clone(), Arc::clone(&decoder));

    match source.list_slides().await {
        Ok(slides) => info!("  Found {} dataset(s)", slides.len()),
        Err(e) => {
            error!("Failed to scan {}: {}", config.root.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let registry = SlideRegistry::with_capacity(source, config.cache_slides);
    let reader = RegionReader::new(decoder).with_background(config.background);
    let service =
        RegionService::with_options(Arc::new(registry), reader, config.service_options());

    let router = create_router(service, build_router_config(&config));

    let addr = config.bind_address();
    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/slides", addr);
    info!("    curl http://{}/tiles/<slide_id>/0/0/0.jpg", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "slidescan_streamer=debug,tower_http=debug"
    } else {
        "slidescan_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Serialize)]
struct DatasetSummary {
    dir: String,
    magnification: f64,
    optimal_tile_size: (u32, u32),
    used_files: usize,
    levels: Vec<LevelInfo>,
}

fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let decoder = ImageTileDecoder::new();
    let pyramid = match PyramidModel::try_open(&config.path, &decoder) {
        Ok(pyramid) => pyramid,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = DatasetSummary {
        dir: pyramid.dir().display().to_string(),
        magnification: pyramid.magnification(),
        optimal_tile_size: pyramid.optimal_tile_size(),
        used_files: pyramid.used_files().len(),
        levels: (0..pyramid.level_count())
            .filter_map(|level| pyramid.level_info(level))
            .collect(),
    };

    if config.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("Dataset: {}", summary.dir);
    println!("Magnification: {}x", summary.magnification);
    println!(
        "Tile size: {}x{}",
        summary.optimal_tile_size.0, summary.optimal_tile_size.1
    );
    println!("Files: {}", summary.used_files);
    println!();
    println!(
        "{:>5}  {:<10} {:>8} {:>8} {:>7} {:>10} {:>10} {:>10}",
        "level", "slot", "width", "height", "tiles", "scale_x", "scale_y", "downsample"
    );
    for (index, info) in summary.levels.iter().enumerate() {
        println!(
            "{:>5}  {:<10} {:>8} {:>8} {:>7} {:>10.4} {:>10.4} {:>10.2}",
            index,
            info.slot.name(),
            info.width,
            info.height,
            info.tile_count,
            info.physical_scale_x,
            info.physical_scale_y,
            info.downsample
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Region Command
// =============================================================================

fn run_region(config: RegionConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let decoder: Arc<dyn TileDecoder> = Arc::new(ImageTileDecoder::new());
    let pyramid = PyramidModel::open(&config.path, decoder.as_ref());
    if !pyramid.is_valid() {
        warn!("Dataset has no usable levels, writing background only");
    } else if config.level >= pyramid.level_count() {
        warn!(
            "Level {} does not exist ({} levels), writing background only",
            config.level,
            pyramid.level_count()
        );
    }

    let reader = RegionReader::new(decoder).with_background(config.background);
    let (pixels, summary) = reader.read_region_vec(
        &pyramid,
        config.level,
        config.x,
        config.y,
        config.width,
        config.height,
    );
    info!(
        composited = summary.tiles_composited,
        failed = summary.tiles_failed,
        "Region read"
    );

    let jpeg = match RegionEncoder::new().encode_rgb(
        pixels,
        config.width,
        config.height,
        config.quality,
    ) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::write(&config.output, &jpeg) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {}x{} region to {}",
        config.width,
        config.height,
        config.output.display()
    );
    ExitCode::SUCCESS
}
