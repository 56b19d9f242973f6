//! Level calibration: inferring pixel geometry from stage-coordinate metadata.
//!
//! Calibration files are routinely incomplete. This module fills the gaps in
//! a fixed order:
//!
//! 1. **Step sizes** per axis: configured value, else the finer tier's step
//!    times [`TIER_MAGNIFICATION_RATIO`], else the smallest observed tile
//!    pitch, else the largest stage coordinate (marked unknown).
//! 2. **Scale factors**: `adj = step / tile_dim`, stage units per pixel.
//! 3. **Stage axis references**: missing references are borrowed from a
//!    related tier, or fall back to [`DEFAULT_STAGE_REF`].
//! 4. **Totals**: the best-calibrated tier computes its pixel size from its
//!    stage extent; the other tiers scale that size by the ratio of scale
//!    factors.
//! 5. **Alignment**: the two fine tiers get a pixel offset that lines them up
//!    under a coarse tier with known step sizes.
//! 6. **Exposure order**: calibrated levels sorted by descending pixel area.
//!
//! The whole pass is a pure function from raw levels to calibrated levels;
//! intermediate state lives in per-slot drafts local to [`LevelCalibrator`].

use tracing::{debug, warn};

use crate::format::{LevelSlot, RawLevel, RawTile};

use super::index::{build_tile_index, IndexGeometry};
use super::level::{Level, StepSize, StepSource};

// =============================================================================
// Constants
// =============================================================================

/// Binning factor between adjacent scan tiers.
pub const TIER_MAGNIFICATION_RATIO: i64 = 4;

/// Stage axis reference used when no tier declares one.
pub const DEFAULT_STAGE_REF: (i64, i64) = (278_000, 142_500);

/// Slots tried, in order, as the reference for total pixel sizes.
const REFERENCE_PREFERENCE: [LevelSlot; 4] = [
    LevelSlot::SlideScan,
    LevelSlot::SlideCond,
    LevelSlot::FinalCond,
    LevelSlot::FinalScan,
];

/// Slots tried, in order, as the coarse frame for alignment.
const ALIGNMENT_TARGETS: [LevelSlot; 2] = [LevelSlot::SlideScan, LevelSlot::SlideCond];

// =============================================================================
// Axis Helpers
// =============================================================================

/// Stage axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Bounding box of tile stage coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageExtent {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl StageExtent {
    /// Extent of a tile list, `None` if it is empty.
    pub fn of(tiles: &[RawTile]) -> Option<Self> {
        let first = tiles.first()?;
        let mut extent = StageExtent {
            min_x: first.stage_x,
            max_x: first.stage_x,
            min_y: first.stage_y,
            max_y: first.stage_y,
        };
        for tile in &tiles[1..] {
            extent.min_x = extent.min_x.min(tile.stage_x);
            extent.max_x = extent.max_x.max(tile.stage_x);
            extent.min_y = extent.min_y.min(tile.stage_y);
            extent.max_y = extent.max_y.max(tile.stage_y);
        }
        Some(extent)
    }
}

/// Smallest positive distance between neighbouring tiles along `axis`.
///
/// Tiles are sorted by the other axis, then by `axis`; only neighbours that
/// share the same coordinate on the other axis are compared.
pub fn tile_pitch(tiles: &[RawTile], axis: Axis) -> Option<i64> {
    let mut keys: Vec<(i64, i64)> = tiles
        .iter()
        .map(|t| match axis {
            Axis::X => (t.stage_y, t.stage_x),
            Axis::Y => (t.stage_x, t.stage_y),
        })
        .collect();
    keys.sort_unstable();

    keys.windows(2)
        .filter(|pair| pair[0].0 == pair[1].0)
        .map(|pair| pair[1].1 - pair[0].1)
        .filter(|diff| *diff > 0)
        .min()
}

/// Pick a step size following the fallback chain.
///
/// * `configured` - value from the level header
/// * `finer` - resolved step of the next finer tier, if that tier was found
/// * `pitch` - smallest observed tile pitch
/// * `max_coord` - largest stage coordinate along the axis
pub fn resolve_step(
    configured: Option<i64>,
    finer: Option<i64>,
    pitch: Option<i64>,
    max_coord: i64,
) -> StepSize {
    if let Some(value) = configured.filter(|v| *v > 0) {
        return StepSize {
            value,
            source: StepSource::Configured,
        };
    }
    if let Some(value) = finer.filter(|v| *v > 0) {
        return StepSize {
            value: value.saturating_mul(TIER_MAGNIFICATION_RATIO),
            source: StepSource::Inherited,
        };
    }
    if let Some(value) = pitch.filter(|v| *v > 0) {
        return StepSize {
            value,
            source: StepSource::Pitch,
        };
    }
    StepSize {
        value: max_coord.saturating_abs(),
        source: StepSource::Fallback,
    }
}

/// Stage units per pixel, defined when both inputs are positive.
pub fn scale_factor(step: i64, tile_dim: u32) -> Option<f64> {
    (step > 0 && tile_dim > 0).then(|| step as f64 / tile_dim as f64)
}

/// Pixel size of a level computed from its own stage extent.
///
/// `floor((max - (min - step)) / adj)`: the span between the extreme tile
/// origins plus one step for the last tile.
pub fn direct_extent(min: i64, max: i64, step: i64, adj: f64) -> Option<u32> {
    let span = max as f64 - (min as f64 - step as f64);
    to_pixels((span / adj).floor())
}

/// Pixel size of a level derived from a reference level's size.
pub fn derived_extent(reference_total: u32, reference_adj: f64, adj: f64) -> Option<u32> {
    to_pixels((reference_total as f64 * (reference_adj / adj)).floor())
}

fn to_pixels(value: f64) -> Option<u32> {
    (value.is_finite() && value >= 1.0 && value <= u32::MAX as f64).then(|| value as u32)
}

/// One axis of a level, as seen by the alignment computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisGeometry {
    /// Tile size in pixels
    pub tile_dim: f64,

    /// Step size in stage units
    pub step: f64,

    /// Largest tile stage coordinate
    pub max: f64,

    /// Stage axis reference
    pub stage_ref: f64,
}

/// Pixel offset that lines a fine level up under a coarse level.
///
/// `divisor` splits the fine level's step when centring its stage origin
/// (2 for the finest tier, 8 for the second). `anchor_stage_ref` is the
/// stage reference of the finest-but-one tier that was found.
pub fn alignment_offset(
    lower: &AxisGeometry,
    higher: &AxisGeometry,
    anchor_stage_ref: f64,
    divisor: f64,
) -> Option<i64> {
    if lower.step <= 0.0 || higher.step <= 0.0 {
        return None;
    }

    let higher_ratio = higher.tile_dim / higher.step;
    let higher_min_base = anchor_stage_ref - higher.max;

    let lower_ratio = lower.tile_dim / lower.step;
    let step_ratio = higher.step / lower.step;

    let stage_base = lower.stage_ref + higher.step / 2.0 - lower.step / divisor;
    let lower_min_base = stage_base - lower.max;

    let offset = (lower_min_base * lower_ratio - higher_min_base * higher_ratio * step_ratio).ceil();
    (offset.is_finite() && offset.abs() < i64::MAX as f64).then(|| offset as i64)
}

/// Resolve stage axis references for all four slots.
///
/// A slot with no declared reference borrows one: the finest tier from
/// SlideScan or FinalCond, SlideScan from FinalScan or FinalCond (only when
/// that tier's X reference is positive), FinalCond and SlideCond from the
/// next finer tier. Slots are processed in order, so borrowing sees earlier
/// resolutions.
pub fn resolve_stage_refs(declared: [Option<(i64, i64)>; 4]) -> [(i64, i64); 4] {
    let mut refs = declared;

    for slot in LevelSlot::ALL {
        let index = slot.index();
        if refs[index].is_some() {
            continue;
        }

        let borrowed = match slot {
            LevelSlot::FinalScan => {
                positive_ref(&refs, LevelSlot::SlideScan).or(positive_ref(&refs, LevelSlot::FinalCond))
            }
            LevelSlot::SlideScan => {
                positive_ref(&refs, LevelSlot::FinalScan).or(positive_ref(&refs, LevelSlot::FinalCond))
            }
            LevelSlot::FinalCond | LevelSlot::SlideCond => {
                slot.finer().and_then(|finer| refs[finer.index()])
            }
        };

        let resolved = borrowed.unwrap_or(DEFAULT_STAGE_REF);
        debug!(slot = %slot, x = resolved.0, y = resolved.1, "Resolved missing stage reference");
        refs[index] = Some(resolved);
    }

    refs.map(|r| r.unwrap_or(DEFAULT_STAGE_REF))
}

fn positive_ref(refs: &[Option<(i64, i64)>; 4], slot: LevelSlot) -> Option<(i64, i64)> {
    refs[slot.index()].filter(|(x, _)| *x > 0)
}

// =============================================================================
// Drafts
// =============================================================================

/// Per-slot working state during calibration.
#[derive(Debug, Clone)]
struct Draft<'a> {
    raw: &'a RawLevel,
    tile_width: u32,
    tile_height: u32,
    extent: StageExtent,
    step_x: StepSize,
    step_y: StepSize,
    adj_x: Option<f64>,
    adj_y: Option<f64>,
    totals: Option<(u32, u32)>,
    alignment: (i64, i64),
}

impl<'a> Draft<'a> {
    fn knows_step_sizes(&self) -> bool {
        self.step_x.is_known() && self.step_y.is_known()
    }

    fn adj(&self) -> Option<(f64, f64)> {
        Some((self.adj_x?, self.adj_y?))
    }

    fn direct_totals(&self) -> Option<(u32, u32)> {
        let (adj_x, adj_y) = self.adj()?;
        let width = direct_extent(self.extent.min_x, self.extent.max_x, self.step_x.value, adj_x)?;
        let height = direct_extent(self.extent.min_y, self.extent.max_y, self.step_y.value, adj_y)?;
        Some((width, height))
    }

    fn axis(&self, axis: Axis, stage_ref: (i64, i64)) -> AxisGeometry {
        match axis {
            Axis::X => AxisGeometry {
                tile_dim: self.tile_width as f64,
                step: self.step_x.value as f64,
                max: self.extent.max_x as f64,
                stage_ref: stage_ref.0 as f64,
            },
            Axis::Y => AxisGeometry {
                tile_dim: self.tile_height as f64,
                step: self.step_y.value as f64,
                max: self.extent.max_y as f64,
                stage_ref: stage_ref.1 as f64,
            },
        }
    }
}

// =============================================================================
// LevelCalibrator
// =============================================================================

/// Turns raw per-slot calibration data into calibrated, exposure-ordered levels.
#[derive(Debug, Clone, Default)]
pub struct LevelCalibrator;

impl LevelCalibrator {
    /// Create a calibrator.
    pub fn new() -> Self {
        Self
    }

    /// Calibrate the given raw levels.
    ///
    /// Raw levels are matched to slots by their `slot` field; slots that are
    /// absent or not found are skipped. The result holds every level whose
    /// geometry could be fully determined, largest pixel area first. An
    /// empty result means the dataset has no readable levels.
    pub fn calibrate(&self, raw_levels: &[RawLevel]) -> Vec<Level> {
        let mut drafts: [Option<Draft<'_>>; 4] = [None, None, None, None];

        for slot in LevelSlot::ALL {
            let Some(raw) = raw_levels.iter().find(|r| r.slot == slot) else {
                continue;
            };
            let finer_step = |axis: Axis| {
                slot.finer()
                    .and_then(|finer| drafts[finer.index()].as_ref())
                    .map(|d| match axis {
                        Axis::X => d.step_x.value,
                        Axis::Y => d.step_y.value,
                    })
            };
            let finer = (finer_step(Axis::X), finer_step(Axis::Y));
            drafts[slot.index()] = Self::draft(raw, finer);
        }

        let stage_refs = resolve_stage_refs(LevelSlot::ALL.map(|slot| {
            raw_levels
                .iter()
                .find(|r| r.slot == slot)
                .and_then(|r| r.header.as_ref())
                .and_then(|h| h.stage_ref_x.zip(h.stage_ref_y))
        }));

        Self::assign_totals(&mut drafts);
        Self::assign_alignment(&mut drafts, &stage_refs);

        let mut levels: Vec<Level> = Vec::new();
        for slot in LevelSlot::ALL {
            let Some(draft) = drafts[slot.index()].as_ref() else {
                continue;
            };
            match Self::finish(slot, draft, stage_refs[slot.index()]) {
                Some(level) => levels.push(level),
                None => warn!(slot = %slot, "Level geometry could not be determined, skipping"),
            }
        }

        // Stable: equal areas keep slot order
        levels.sort_by(|a, b| b.area().cmp(&a.area()));
        levels
    }

    /// Steps 1 and 2 for one slot.
    fn draft(raw: &RawLevel, finer: (Option<i64>, Option<i64>)) -> Option<Draft<'_>> {
        if !raw.is_found() {
            debug!(slot = %raw.slot, "Slot not found");
            return None;
        }
        let header = raw.header.as_ref()?;
        let (tile_width, tile_height) = raw.tile_size?;
        let extent = StageExtent::of(&raw.tiles)?;

        let step_x = resolve_step(
            header.step_x,
            finer.0,
            tile_pitch(&raw.tiles, Axis::X),
            extent.max_x,
        );
        let step_y = resolve_step(
            header.step_y,
            finer.1,
            tile_pitch(&raw.tiles, Axis::Y),
            extent.max_y,
        );
        let adj_x = scale_factor(step_x.value, tile_width);
        let adj_y = scale_factor(step_y.value, tile_height);

        debug!(
            slot = %raw.slot,
            tile_width,
            tile_height,
            min_x = extent.min_x,
            max_x = extent.max_x,
            min_y = extent.min_y,
            max_y = extent.max_y,
            step_x = step_x.value,
            step_x_source = ?step_x.source,
            step_y = step_y.value,
            step_y_source = ?step_y.source,
            ?adj_x,
            ?adj_y,
            "Resolved level steps"
        );

        Some(Draft {
            raw,
            tile_width,
            tile_height,
            extent,
            step_x,
            step_y,
            adj_x,
            adj_y,
            totals: None,
            alignment: (0, 0),
        })
    }

    /// Step 4: total pixel sizes.
    fn assign_totals(drafts: &mut [Option<Draft<'_>>; 4]) {
        let reference = REFERENCE_PREFERENCE.into_iter().find_map(|slot| {
            let draft = drafts[slot.index()].as_ref()?;
            if !draft.knows_step_sizes() {
                return None;
            }
            Some((slot, draft.direct_totals()?, draft.adj()?))
        });

        match reference {
            Some((reference_slot, reference_totals, reference_adj)) => {
                debug!(
                    slot = %reference_slot,
                    width = reference_totals.0,
                    height = reference_totals.1,
                    "Reference level for totals"
                );
                for (index, draft) in drafts.iter_mut().enumerate() {
                    let Some(draft) = draft.as_mut() else {
                        continue;
                    };
                    draft.totals = if index == reference_slot.index() {
                        Some(reference_totals)
                    } else {
                        draft.adj().and_then(|(adj_x, adj_y)| {
                            Some((
                                derived_extent(reference_totals.0, reference_adj.0, adj_x)?,
                                derived_extent(reference_totals.1, reference_adj.1, adj_y)?,
                            ))
                        })
                    };
                }
            }
            None => {
                debug!("No level knows both step sizes, computing totals per level");
                for draft in drafts.iter_mut().flatten() {
                    draft.totals = draft.direct_totals();
                }
            }
        }
    }

    /// Step 5: alignment offsets for the two finest tiers.
    fn assign_alignment(drafts: &mut [Option<Draft<'_>>; 4], stage_refs: &[(i64, i64); 4]) {
        let Some(higher_slot) = ALIGNMENT_TARGETS.into_iter().find(|slot| {
            drafts[slot.index()]
                .as_ref()
                .is_some_and(|d| d.knows_step_sizes())
        }) else {
            return;
        };

        let anchor_slot = [LevelSlot::FinalCond, LevelSlot::FinalScan]
            .into_iter()
            .find(|slot| drafts[slot.index()].is_some());
        let Some(anchor_slot) = anchor_slot else {
            return;
        };

        let Some(higher) = drafts[higher_slot.index()].clone() else {
            return;
        };
        let higher_ref = stage_refs[higher_slot.index()];
        let anchor_ref = stage_refs[anchor_slot.index()];

        for (lower_slot, divisor) in [(LevelSlot::FinalScan, 2.0), (LevelSlot::FinalCond, 8.0)] {
            let Some(lower) = drafts[lower_slot.index()].as_mut() else {
                continue;
            };
            let lower_ref = stage_refs[lower_slot.index()];

            let offset_x = alignment_offset(
                &lower.axis(Axis::X, lower_ref),
                &higher.axis(Axis::X, higher_ref),
                anchor_ref.0 as f64,
                divisor,
            );
            let offset_y = alignment_offset(
                &lower.axis(Axis::Y, lower_ref),
                &higher.axis(Axis::Y, higher_ref),
                anchor_ref.1 as f64,
                divisor,
            );

            lower.alignment = (offset_x.unwrap_or(0), offset_y.unwrap_or(0));
            debug!(
                slot = %lower_slot,
                against = %higher_slot,
                x = lower.alignment.0,
                y = lower.alignment.1,
                "Alignment offset"
            );
        }
    }

    /// Steps 6 prerequisites: build the immutable level.
    fn finish(slot: LevelSlot, draft: &Draft<'_>, stage_ref: (i64, i64)) -> Option<Level> {
        let (adj_x, adj_y) = draft.adj()?;
        let (total_width, total_height) = draft.totals?;

        let tiles = build_tile_index(
            &draft.raw.tiles,
            &IndexGeometry {
                max_x: draft.extent.max_x,
                max_y: draft.extent.max_y,
                adj_x,
                adj_y,
                offset: draft.alignment,
            },
        );

        debug!(
            slot = %slot,
            total_width,
            total_height,
            tiles = tiles.len(),
            "Calibrated level"
        );

        Some(Level {
            slot,
            source: draft.raw.source.clone(),
            tile_width: draft.tile_width,
            tile_height: draft.tile_height,
            step_x: draft.step_x,
            step_y: draft.step_y,
            adj_x,
            adj_y,
            stage_ref_x: stage_ref.0,
            stage_ref_y: stage_ref.1,
            min_x: draft.extent.min_x,
            max_x: draft.extent.max_x,
            min_y: draft.extent.min_y,
            max_y: draft.extent.max_y,
            total_width,
            total_height,
            alignment: draft.alignment,
            tiles,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
