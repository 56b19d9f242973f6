//! Locating the per-level calibration files of a dataset.
//!
//! A dataset directory holds up to four calibration files, one per scan
//! tier. The scanner software is inconsistent about capitalisation, so each
//! slot probes a fixed list of case variants and takes the first that exists.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Extension appended to a tile section name to find its image file.
pub const TILE_EXTENSION: &str = "jpg";

/// One of the four candidate scan tiers, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LevelSlot {
    FinalScan,
    FinalCond,
    SlideScan,
    SlideCond,
}

impl LevelSlot {
    /// All slots in probing order.
    pub const ALL: [LevelSlot; 4] = [
        LevelSlot::FinalScan,
        LevelSlot::FinalCond,
        LevelSlot::SlideScan,
        LevelSlot::SlideCond,
    ];

    /// Slot position, 0 (finest) to 3 (coarsest).
    pub fn index(self) -> usize {
        match self {
            LevelSlot::FinalScan => 0,
            LevelSlot::FinalCond => 1,
            LevelSlot::SlideScan => 2,
            LevelSlot::SlideCond => 3,
        }
    }

    /// Slot for a position, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The next finer slot (`index - 1`).
    pub fn finer(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Canonical name of the tier.
    pub fn name(self) -> &'static str {
        match self {
            LevelSlot::FinalScan => "FinalScan",
            LevelSlot::FinalCond => "FinalCond",
            LevelSlot::SlideScan => "SlideScan",
            LevelSlot::SlideCond => "SlideCond",
        }
    }

    /// Calibration file names probed for this slot, in priority order.
    pub fn file_names(self) -> [&'static str; 4] {
        match self {
            LevelSlot::FinalScan => [
                "FinalScan.ini",
                "Finalscan.ini",
                "finalScan.ini",
                "finalscan.ini",
            ],
            LevelSlot::FinalCond => [
                "FinalCond.ini",
                "Finalcond.ini",
                "finalCond.ini",
                "finalcond.ini",
            ],
            LevelSlot::SlideScan => [
                "SlideScan.ini",
                "Slidescan.ini",
                "slideScan.ini",
                "slidescan.ini",
            ],
            LevelSlot::SlideCond => [
                "SlideCond.ini",
                "Slidecond.ini",
                "slideCond.ini",
                "slidecond.ini",
            ],
        }
    }
}

impl fmt::Display for LevelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve the directory holding a dataset.
///
/// Callers may pass either the directory itself or any file inside it
/// (typically one of the calibration files).
pub fn dataset_dir(path: &Path) -> PathBuf {
    if path.is_file() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                return parent.to_path_buf();
            }
        }
        return PathBuf::from(".");
    }
    path.to_path_buf()
}

/// Probe for the calibration file of one slot.
pub fn locate_calibration(dir: &Path, slot: LevelSlot) -> Option<PathBuf> {
    let found = slot
        .file_names()
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file());

    match &found {
        Some(path) => debug!(slot = %slot, path = %path.display(), "Found calibration file"),
        None => debug!(slot = %slot, dir = %dir.display(), "No calibration file for slot"),
    }
    found
}

/// Probe all four slots.
pub fn locate_all(dir: &Path) -> [Option<PathBuf>; 4] {
    LevelSlot::ALL.map(|slot| locate_calibration(dir, slot))
}

/// Whether the directory contains at least one calibration file.
pub fn has_calibration(dir: &Path) -> bool {
    LevelSlot::ALL.iter().any(|slot| {
        slot.file_names()
            .iter()
            .any(|name| dir.join(name).is_file())
    })
}

/// Path of the image file backing a tile section.
pub fn tile_path(dir: &Path, section: &str) -> PathBuf {
    dir.join(format!("{}.{}", section, TILE_EXTENSION))
}

// =============================================================================
// Tests
// =============================================================================
