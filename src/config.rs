//! Command-line configuration.
//!
//! One [`Cli`] with three subcommands:
//!
//! - `serve` - run the HTTP server over a root directory of datasets
//! - `info` - open one dataset and print its levels
//! - `region` - write one region of a dataset as JPEG
//!
//! # Environment Variables
//!
//! `serve` options can also be set with the `SLIDESCAN_` prefix:
//!
//! - `SLIDESCAN_ROOT` - Directory whose sub-directories are datasets
//! - `SLIDESCAN_HOST` - Server bind address (default: 0.0.0.0)
//! - `SLIDESCAN_PORT` - Server port (default: 3000)
//! - `SLIDESCAN_CACHE_SLIDES` - Opened slides kept (default: 64)
//! - `SLIDESCAN_CACHE_REGIONS` - Encoded region cache in bytes (default: 64MB)
//! - `SLIDESCAN_TILE_SIZE` - Grid tile size (default: 512)
//! - `SLIDESCAN_MAX_REGION_SIZE` - Largest region side (default: 4096)
//! - `SLIDESCAN_BACKGROUND` - Fill byte for uncovered pixels (default: 255)
//! - `SLIDESCAN_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `SLIDESCAN_CORS_ORIGINS` - Comma-separated allowed origins

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::slide::DEFAULT_SLIDE_CACHE_CAPACITY;
use crate::tile::{
    is_valid_quality, ServiceOptions, DEFAULT_BACKGROUND, DEFAULT_JPEG_QUALITY,
    DEFAULT_REGION_CACHE_CAPACITY, DEFAULT_TILE_SIZE, MAX_REGION_SIZE,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Largest region the `region` subcommand will write.
pub const MAX_CLI_REGION_SIZE: u32 = 32_768;

// =============================================================================
// CLI
// =============================================================================

/// Slide Scan Streamer - serves multi-level slide scanner datasets.
#[derive(Parser, Debug, Clone)]
#[command(name = "slidescan-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// The selected subcommand.
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Print the calibrated levels of one dataset.
    Info(InfoConfig),

    /// Write one region of a dataset as JPEG.
    Region(RegionConfig),
}

// =============================================================================
// serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Directory whose sub-directories are datasets.
    #[arg(long, env = "SLIDESCAN_ROOT")]
    pub root: PathBuf,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "SLIDESCAN_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SLIDESCAN_PORT")]
    pub port: u16,

    /// Maximum number of opened slides to keep.
    #[arg(long, default_value_t = DEFAULT_SLIDE_CACHE_CAPACITY, env = "SLIDESCAN_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Byte budget of the encoded region cache.
    #[arg(long, default_value_t = DEFAULT_REGION_CACHE_CAPACITY, env = "SLIDESCAN_CACHE_REGIONS")]
    pub cache_regions: usize,

    /// Grid tile size served by the tile endpoint.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "SLIDESCAN_TILE_SIZE")]
    pub tile_size: u32,

    /// Largest region side accepted per request.
    #[arg(long, default_value_t = MAX_REGION_SIZE, env = "SLIDESCAN_MAX_REGION_SIZE")]
    pub max_region_size: u32,

    /// Fill byte for pixels no tile covers.
    #[arg(long, default_value_t = DEFAULT_BACKGROUND, env = "SLIDESCAN_BACKGROUND")]
    pub background: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "SLIDESCAN_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin if unset.
    #[arg(long, env = "SLIDESCAN_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.root.is_dir() {
            return Err(format!(
                "Root directory {} does not exist. Set --root or SLIDESCAN_ROOT",
                self.root.display()
            ));
        }
        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        if self.cache_regions == 0 {
            return Err("cache_regions must be greater than 0".to_string());
        }
        if self.tile_size == 0 || self.tile_size > self.max_region_size {
            return Err("tile_size must be between 1 and max_region_size".to_string());
        }
        if self.max_region_size == 0 {
            return Err("max_region_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Region service options.
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            cache_capacity: self.cache_regions,
            tile_size: self.tile_size,
            max_region_size: self.max_region_size,
        }
    }
}

// =============================================================================
// info
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Dataset directory or one of its calibration files.
    pub path: PathBuf,

    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// region
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RegionConfig {
    /// Dataset directory or one of its calibration files.
    pub path: PathBuf,

    /// Exposed level (0 = largest).
    #[arg(long, default_value_t = 0)]
    pub level: usize,

    /// Left edge in level pixels.
    #[arg(long, allow_hyphen_values = true)]
    pub x: i64,

    /// Top edge in level pixels.
    #[arg(long, allow_hyphen_values = true)]
    pub y: i64,

    /// Region width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Region height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Output JPEG file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Fill byte for pixels no tile covers.
    #[arg(long, default_value_t = DEFAULT_BACKGROUND)]
    pub background: u8,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RegionConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.width > MAX_CLI_REGION_SIZE || self.height > MAX_CLI_REGION_SIZE {
            return Err(format!(
                "width and height must be at most {}",
                MAX_CLI_REGION_SIZE
            ));
        }
        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
