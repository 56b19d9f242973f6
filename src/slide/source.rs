//! Where slides come from.
//!
//! A [`SlideSource`] lists slide identifiers and opens them into calibrated
//! pyramids. [`LocalSlideSource`] serves a directory tree: every immediate
//! sub-directory holding at least one calibration file is a slide, and its
//! directory name is the slide id.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{IoError, OpenError};
use crate::format::has_calibration;
use crate::pyramid::PyramidModel;
use crate::tile::TileDecoder;

// =============================================================================
// SlideSource Trait
// =============================================================================

/// Lists and opens slides.
#[async_trait]
pub trait SlideSource: Send + Sync + 'static {
    /// Identifiers of all available slides, sorted.
    async fn list_slides(&self) -> Result<Vec<String>, IoError>;

    /// Open and calibrate one slide.
    ///
    /// Unknown ids fail with `OpenError::Io(IoError::NotFound(_))`; a slide
    /// with no usable level fails with `OpenError::NoLevels`.
    async fn open_slide(&self, slide_id: &str) -> Result<PyramidModel, OpenError>;
}

// =============================================================================
// LocalSlideSource
// =============================================================================

/// Slides stored as dataset directories under a common root.
#[derive(Clone)]
pub struct LocalSlideSource {
    root: PathBuf,
    decoder: Arc<dyn TileDecoder>,
}

impl LocalSlideSource {
    /// Serve the datasets under `root`, probing tiles with `decoder`.
    pub fn new(root: impl Into<PathBuf>, decoder: Arc<dyn TileDecoder>) -> Self {
        Self {
            root: root.into(),
            decoder,
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a slide id, if the id is a plain directory name.
    fn slide_dir(&self, slide_id: &str) -> Option<PathBuf> {
        let plain = !slide_id.is_empty()
            && slide_id != "."
            && slide_id != ".."
            && !slide_id.contains(['/', '\\']);
        plain.then(|| self.root.join(slide_id))
    }
}

impl std::fmt::Debug for LocalSlideSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSlideSource")
            .field("root", &self.root)
            .finish()
    }
}

/// Scan `root` for dataset directories.
fn scan_root(root: &Path) -> Result<Vec<String>, IoError> {
    let display = root.display().to_string();
    let entries = std::fs::read_dir(root).map_err(|e| IoError::from_std(display.clone(), &e))?;

    let mut slides = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IoError::from_std(display.clone(), &e))?;
        let path = entry.path();
        if !path.is_dir() || !has_calibration(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            slides.push(name.to_string());
        }
    }
    slides.sort();
    Ok(slides)
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    async fn list_slides(&self) -> Result<Vec<String>, IoError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_root(&root))
            .await
            .map_err(|e| IoError::Read {
                path: self.root.display().to_string(),
                message: e.to_string(),
            })?
    }

    async fn open_slide(&self, slide_id: &str) -> Result<PyramidModel, OpenError> {
        let Some(dir) = self.slide_dir(slide_id) else {
            return Err(IoError::NotFound(slide_id.to_string()).into());
        };
        if !dir.is_dir() || !has_calibration(&dir) {
            debug!(slide_id, dir = %dir.display(), "No dataset for slide id");
            return Err(IoError::NotFound(slide_id.to_string()).into());
        }

        let decoder = Arc::clone(&self.decoder);
        let display = dir.display().to_string();
        tokio::task::spawn_blocking(move || PyramidModel::try_open(&dir, decoder.as_ref()))
            .await
            .map_err(|e| {
                OpenError::from(IoError::Read {
                    path: display,
                    message: e.to_string(),
                })
            })?
    }
}

// =============================================================================
// Tests
// =============================================================================
