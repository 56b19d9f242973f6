//! Slide access layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             RegionService               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideRegistry                │
//! │  (LRU of opened pyramids, single-flight)│
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          SlideSource Trait              │
//! │  LocalSlideSource: dataset directories  │
//! └─────────────────────────────────────────┘
//! ```

mod registry;
mod source;

pub use registry::{SlideRegistry, DEFAULT_SLIDE_CACHE_CAPACITY};
pub use source::{LocalSlideSource, SlideSource};
