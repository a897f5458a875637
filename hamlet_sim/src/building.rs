// Buildings: lifecycle state machine, footprint geometry, and world markers.
//
// A `Building` is a reserved, in-progress, completed, or cancelled instance
// of a structure template at a position and rotation inside a settlement.
// It owns its `MaterialLedger` and the positions of the marker blocks it put
// into the world.
//
// ## Lifecycle
//
//   RESERVED ──start──> IN_PROGRESS ──queue drained──> COMPLETED
//      │                     │
//      └──────cancel─────────┴──> CANCELLED (removed from the settlement)
//
// `transition` is the only way the status changes. Every other move
// (COMPLETED -> anything, CANCELLED -> anything, RESERVED -> COMPLETED) is
// an `InvalidTransition`. Progress is a fraction in `[0, 1]` that only ever
// increases; `set_progress` ignores regressions.
//
// ## Markers
//
// Previews go on every non-air template position. Placeholders then go on
// whichever (deduplicated) corners of the footprint bounding box are still
// free, marking the extent where no preview does. Both are only written
// where the world is air or replaceable and no other marker sits.
// Clearing only removes markers this building still owns, so a marker that
// was overwritten by a real block is left alone.
//
// See also: `ledger.rs` for the ledger, `world.rs` for the marker table,
// `validation.rs` for footprint overlap, `settlement.rs` for persistence.

use crate::config::GameConfig;
use crate::error::BuildError;
use crate::ledger::{MaterialLedger, MaterialMap};
use crate::rotation::Rotation;
use crate::template::{BuildingCategory, StructureTemplate};
use crate::types::{BuildingId, SettlementId, VoxelCoord};
use crate::world::{Marker, MarkerKind, VoxelWorld};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildingStatus {
    #[default]
    Reserved,
    InProgress,
    Completed,
    Cancelled,
}

impl BuildingStatus {
    pub fn can_transition(self, to: BuildingStatus) -> bool {
        use BuildingStatus::*;
        matches!(
            (self, to),
            (Reserved, InProgress) | (Reserved, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }

    /// The persisted name, e.g. `"IN_PROGRESS"`.
    pub fn as_str(self) -> &'static str {
        match self {
            BuildingStatus::Reserved => "RESERVED",
            BuildingStatus::InProgress => "IN_PROGRESS",
            BuildingStatus::Completed => "COMPLETED",
            BuildingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Inverse of `as_str`. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        [
            BuildingStatus::Reserved,
            BuildingStatus::InProgress,
            BuildingStatus::Completed,
            BuildingStatus::Cancelled,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for BuildingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildingStatus::Reserved => "reserved",
            BuildingStatus::InProgress => "in-progress",
            BuildingStatus::Completed => "completed",
            BuildingStatus::Cancelled => "cancelled",
        })
    }
}

// ---------------------------------------------------------------------------
// Footprint geometry
// ---------------------------------------------------------------------------

/// Inclusive axis-aligned box of block positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Aabb {
    pub min: VoxelCoord,
    pub max: VoxelCoord,
}

impl Aabb {
    pub fn from_corners(a: VoxelCoord, b: VoxelCoord) -> Self {
        Self {
            min: VoxelCoord::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: VoxelCoord::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn contains(&self, p: VoxelCoord) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    /// Number of block positions inside.
    pub fn volume(&self) -> i64 {
        let span = |lo: i32, hi: i32| (hi as i64) - (lo as i64) + 1;
        span(self.min.x, self.max.x) * span(self.min.y, self.max.y) * span(self.min.z, self.max.z)
    }

    /// The distinct corners, in a fixed order. A flat or thin box has
    /// fewer than eight.
    pub fn corners(&self) -> SmallVec<[VoxelCoord; 8]> {
        let mut out: SmallVec<[VoxelCoord; 8]> = SmallVec::new();
        for x in [self.min.x, self.max.x] {
            for y in [self.min.y, self.max.y] {
                for z in [self.min.z, self.max.z] {
                    let c = VoxelCoord::new(x, y, z);
                    if !out.contains(&c) {
                        out.push(c);
                    }
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Building {
    pub id: BuildingId,
    pub settlement_id: SettlementId,
    pub structure_ref: String,
    pub position: VoxelCoord,
    pub rotation: Rotation,
    pub category: BuildingCategory,
    pub ledger: MaterialLedger,
    pub placeholder_positions: SmallVec<[VoxelCoord; 8]>,
    pub preview_positions: Vec<VoxelCoord>,
    status: BuildingStatus,
    progress: f32,
}

impl Building {
    /// A fresh RESERVED building with requirements taken from `template`.
    pub fn reserve(
        id: BuildingId,
        settlement_id: SettlementId,
        template: &StructureTemplate,
        position: VoxelCoord,
        rotation: Rotation,
    ) -> Self {
        Self {
            id,
            settlement_id,
            structure_ref: template.id.clone(),
            position,
            rotation,
            category: template.category,
            ledger: MaterialLedger::from_template(template),
            placeholder_positions: SmallVec::new(),
            preview_positions: Vec::new(),
            status: BuildingStatus::Reserved,
            progress: 0.0,
        }
    }

    /// Reassemble a building from persisted parts.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: BuildingId,
        settlement_id: SettlementId,
        structure_ref: String,
        position: VoxelCoord,
        rotation: Rotation,
        status: BuildingStatus,
        progress: f32,
        category: BuildingCategory,
        ledger: MaterialLedger,
    ) -> Self {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            id,
            settlement_id,
            structure_ref,
            position,
            rotation,
            category,
            ledger,
            placeholder_positions: SmallVec::new(),
            preview_positions: Vec::new(),
            status,
            progress,
        }
    }

    pub fn status(&self) -> BuildingStatus {
        self.status
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn transition(&mut self, to: BuildingStatus) -> Result<(), BuildError> {
        if !self.status.can_transition(to) {
            return Err(BuildError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to == BuildingStatus::Completed {
            self.progress = 1.0;
        }
        Ok(())
    }

    /// Raise progress to `fraction` (clamped to `[0, 1]`). Lower values are
    /// ignored.
    pub fn set_progress(&mut self, fraction: f32) {
        if fraction.is_finite() {
            self.progress = self.progress.max(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn snapshot(&self) -> BuildingSnapshot {
        BuildingSnapshot {
            id: self.id,
            settlement_id: self.settlement_id,
            structure_ref: self.structure_ref.clone(),
            position: self.position,
            rotation: self.rotation,
            status: self.status,
            progress: self.progress,
            category: self.category,
            required_materials: self.ledger.required().clone(),
            provided_materials: self.ledger.provided().clone(),
            has_all_materials: self.ledger.has_all_materials(),
        }
    }

    // -- markers --------------------------------------------------------------

    /// Put placeholder markers on the footprint corners.
    pub fn place_placeholders(&mut self, world: &mut VoxelWorld, footprint: &Aabb, config: &GameConfig) {
        for corner in footprint.corners() {
            if self.try_place_marker(world, corner, MarkerKind::Placeholder, None, config) {
                self.placeholder_positions.push(corner);
            }
        }
    }

    /// Put preview markers on every non-air template position.
    pub fn place_previews(&mut self, world: &mut VoxelWorld, template: &StructureTemplate, config: &GameConfig) {
        for (pos, block) in template.world_blocks(self.position, self.rotation) {
            if block.block.is_air() {
                continue;
            }
            let depicts = Some(block.block.clone());
            if self.try_place_marker(world, pos, MarkerKind::Preview, depicts, config) {
                self.preview_positions.push(pos);
            }
        }
    }

    fn try_place_marker(
        &self,
        world: &mut VoxelWorld,
        pos: VoxelCoord,
        kind: MarkerKind,
        depicts: Option<crate::types::BlockId>,
        config: &GameConfig,
    ) -> bool {
        if !world.is_loaded(pos) || world.marker(pos).is_some() {
            return false;
        }
        if !config.is_replaceable(&world.block_id(pos)) {
            return false;
        }
        let marker_block = match kind {
            MarkerKind::Placeholder => &config.placeholder_block,
            MarkerKind::Preview => &config.preview_block,
        };
        let marker = Marker {
            kind,
            owner: self.id,
            depicts,
        };
        world.place_marker(pos, marker, marker_block)
    }

    /// Remove every placeholder this building still owns. Returns how many
    /// were removed.
    pub fn clear_placeholders(&mut self, world: &mut VoxelWorld) -> usize {
        let id = self.id;
        self.placeholder_positions
            .drain(..)
            .filter(|p| world.clear_marker(*p, id, MarkerKind::Placeholder))
            .count()
    }

    pub fn clear_previews(&mut self, world: &mut VoxelWorld) -> usize {
        let id = self.id;
        self.preview_positions
            .drain(..)
            .filter(|p| world.clear_marker(*p, id, MarkerKind::Preview))
            .count()
    }

    pub fn clear_markers(&mut self, world: &mut VoxelWorld) -> usize {
        self.clear_placeholders(world) + self.clear_previews(world)
    }
}

/// Read-only view of a building, returned by queries and command responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingSnapshot {
    pub id: BuildingId,
    pub settlement_id: SettlementId,
    pub structure_ref: String,
    pub position: VoxelCoord,
    pub rotation: Rotation,
    pub status: BuildingStatus,
    pub progress: f32,
    pub category: BuildingCategory,
    pub required_materials: MaterialMap,
    pub provided_materials: MaterialMap,
    pub has_all_materials: bool,
}
