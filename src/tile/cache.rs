//! Cache of encoded JPEG regions.
//!
//! Compositing a region decodes every tile it touches, so repeated requests
//! for the same rectangle are served from here. Entries are keyed by the
//! full request (slide, level, rectangle, quality) and evicted in LRU order
//! once the total encoded size exceeds the byte budget.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default byte budget: 64MB
pub const DEFAULT_REGION_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default entry bound, independent of the byte budget.
pub const DEFAULT_REGION_CACHE_ENTRIES: usize = 4_096;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies one encoded region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionCacheKey {
    /// Slide identifier
    pub slide_id: Arc<str>,

    /// Exposed level index
    pub level: usize,

    /// Left edge in level pixels
    pub x: i64,

    /// Top edge in level pixels
    pub y: i64,

    /// Region width
    pub width: u32,

    /// Region height
    pub height: u32,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl RegionCacheKey {
    /// Create a key.
    pub fn new(
        slide_id: impl Into<Arc<str>>,
        level: usize,
        (x, y): (i64, i64),
        (width, height): (u32, u32),
        quality: u8,
    ) -> Self {
        Self {
            slide_id: slide_id.into(),
            level,
            x,
            y,
            width,
            height,
            quality,
        }
    }
}

// =============================================================================
// RegionCache
// =============================================================================

struct Entries {
    lru: LruCache<RegionCacheKey, Bytes>,
    bytes: usize,
}

/// Byte-bounded LRU of encoded regions, shareable across tasks.
pub struct RegionCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl RegionCache {
    /// Cache with the default budget.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_REGION_CACHE_CAPACITY, DEFAULT_REGION_CACHE_ENTRIES)
    }

    /// Cache with the given byte budget and the default entry bound.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self::with_limits(max_bytes, DEFAULT_REGION_CACHE_ENTRIES)
    }

    /// Cache with explicit byte and entry bounds.
    pub fn with_limits(max_bytes: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(max_entries),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Look up a region, marking it recently used.
    pub async fn get(&self, key: &RegionCacheKey) -> Option<Bytes> {
        self.entries.lock().await.lru.get(key).cloned()
    }

    /// Whether a region is cached, without touching LRU order.
    pub async fn contains(&self, key: &RegionCacheKey) -> bool {
        self.entries.lock().await.lru.contains(key)
    }

    /// Store a region, evicting old entries to stay within budget.
    ///
    /// A value larger than the whole budget is not stored.
    pub async fn put(&self, key: RegionCacheKey, data: Bytes) {
        if data.len() > self.max_bytes {
            return;
        }

        let mut entries = self.entries.lock().await;
        let size = data.len();

        // `push` returns the replaced value or the entry evicted by the entry bound
        if let Some((_, old)) = entries.lru.push(key, data) {
            entries.bytes = entries.bytes.saturating_sub(old.len());
        }
        entries.bytes += size;

        while entries.bytes > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => entries.bytes = entries.bytes.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    /// Drop every cached region of one slide.
    pub async fn invalidate_slide(&self, slide_id: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let doomed: Vec<RegionCacheKey> = entries
            .lru
            .iter()
            .filter(|(k, _)| &*k.slide_id == slide_id)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            if let Some(data) = entries.lru.pop(key) {
                entries.bytes = entries.bytes.saturating_sub(data.len());
            }
        }
        doomed.len()
    }

    /// Remove everything.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.lru.clear();
        entries.bytes = 0;
    }

    /// Number of cached regions.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.lru.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total encoded bytes held.
    pub async fn size(&self) -> usize {
        self.entries.lock().await.bytes
    }

    /// Byte budget.
    pub fn capacity(&self) -> usize {
        self.max_bytes
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
