//! Registry of opened slides.
//!
//! Opening a slide reads every calibration file and probes tiles, so opened
//! pyramids are kept in an LRU. Concurrent requests for a slide that is not
//! cached share one open: the first caller runs it, the others wait on the
//! same cell and receive the same result.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::{IoError, OpenError};
use crate::pyramid::PyramidModel;

use super::source::SlideSource;

/// Default number of opened slides kept.
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 64;

type OpenResult = Result<Arc<PyramidModel>, OpenError>;

/// LRU of opened pyramids with single-flight opening.
pub struct SlideRegistry<S: SlideSource> {
    source: S,
    cache: Mutex<LruCache<String, Arc<PyramidModel>>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<OpenResult>>>>,
}

impl<S: SlideSource> SlideRegistry<S> {
    /// Registry with the default capacity.
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_SLIDE_CACHE_CAPACITY)
    }

    /// Registry keeping at most `capacity` opened slides.
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            cache: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get an opened slide, opening it on first access.
    ///
    /// Failed opens are not cached; the next request retries.
    pub async fn get_slide(&self, slide_id: &str) -> OpenResult {
        if let Some(slide) = self.cache.lock().await.get(slide_id) {
            return Ok(Arc::clone(slide));
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(slide_id.to_string()).or_default())
        };

        let result = cell
            .get_or_init(|| async {
                debug!(slide_id, "Opening slide");
                let opened = self.source.open_slide(slide_id).await.map(Arc::new);
                if let Ok(slide) = &opened {
                    info!(slide_id, levels = slide.level_count(), "Slide opened");
                    self.cache
                        .lock()
                        .await
                        .put(slide_id.to_string(), Arc::clone(slide));
                }
                opened
            })
            .await
            .clone();

        // Only the cell we waited on is retired; a newer open may already be running
        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(slide_id)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(slide_id);
        }

        result
    }

    /// All slide ids known to the source.
    pub async fn list_slides(&self) -> Result<Vec<String>, IoError> {
        self.source.list_slides().await
    }

    /// Drop one slide from the cache, forcing a reopen on next access.
    pub async fn invalidate(&self, slide_id: &str) {
        self.cache.lock().await.pop(slide_id);
    }

    /// Drop every cached slide.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Number of cached slides.
    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

// =============================================================================
// Tests
// =============================================================================
