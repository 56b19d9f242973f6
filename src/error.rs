use thiserror::Error;

/// I/O errors that can occur when reading calibration or tile files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// File exists but could not be read
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },
}

impl IoError {
    /// Classify a `std::io::Error` for the given path.
    pub fn from_std(path: impl Into<String>, err: &std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::Read {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised while decoding a single tile file
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The tile file could not be opened or read
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The tile file is not a decodable image
    #[error("Failed to decode {path}: {message}")]
    Image { path: String, message: String },

    /// The decoded buffer does not match its declared geometry
    #[error("Malformed tile buffer for {path}: expected {expected} bytes, got {actual}")]
    MalformedBuffer {
        path: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors surfaced when opening a dataset
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// I/O error while locating the dataset
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// No calibration file produced a usable level
    #[error("No readable levels in dataset: {path}")]
    NoLevels { path: String },
}

/// Errors from the region service (request validation, encoding)
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    /// Slide could not be found in the source
    #[error("Slide not found: {slide_id}")]
    SlideNotFound { slide_id: String },

    /// Slide exists but could not be opened
    #[error("Failed to open slide: {0}")]
    Open(#[from] OpenError),

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: slide has {max_levels} levels")]
    InvalidLevel { level: usize, max_levels: usize },

    /// Requested region has a zero dimension
    #[error("Invalid region size {width}x{height}")]
    InvalidRegion { width: u32, height: u32 },

    /// Requested region exceeds the per-request limit
    #[error("Region {width}x{height} exceeds the maximum of {max} pixels per side")]
    RegionTooLarge { width: u32, height: u32, max: u32 },

    /// Requested grid tile lies outside the level
    #[error("Tile ({x}, {y}) at level {level} is out of bounds (max: {max_x}, {max_y})")]
    TileOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// JPEG quality parameter out of range
    #[error("Invalid quality: {quality} (must be 1-100)")]
    InvalidQuality { quality: u8 },

    /// Failed to encode the composited region
    #[error("Encode error: {message}")]
    EncodeError { message: String },

    /// Background read task failed
    #[error("Internal error: {message}")]
    Internal { message: String },
}
