// Sparse block world: the construction system's view of the game world.
//
// The host world is external; `VoxelWorld` is the in-process model of the
// parts construction touches:
//
// - Blocks: a sparse `BTreeMap<VoxelCoord, WorldBlock>`. Absent positions
//   are air.
// - Chunk residency: every chunk column is resident unless it has been
//   marked unloaded. Reads of unloaded chunks still answer (the data is
//   kept), but validation and the scheduler refuse to act there.
// - Markers: placeholder and preview blocks, each owned by one building.
//   A marker is also written as a block (the configured marker block id) so
//   anything reading the world sees it, while the marker table records the
//   owner and, for previews, the block it stands in for.
// - Containers: storage inventories keyed by position.
//
// Writes through `set_block` replace whatever was there, including markers.
// `clear_marker` only removes a marker its caller owns, and only while the
// marker is still present, so a building tearing down never erases a block
// that has since been placed over its marker.
//
// See also: `validation.rs` (reads), `scheduler.rs` (block writes),
// `building.rs` (marker placement), `scanner.rs` (containers).
//
// **Critical constraint: determinism.** Ordered maps only; container
// enumeration order is position order.

use crate::container::Container;
use crate::types::{BlockId, BlockState, BuildingId, ChunkCoord, VoxelCoord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A placed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBlock {
    pub block: BlockId,
    #[serde(default, skip_serializing_if = "BlockState::is_empty")]
    pub state: BlockState,
}

impl WorldBlock {
    pub fn new(block: BlockId, state: BlockState) -> Self {
        Self { block, state }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    /// Reserves a footprint corner.
    Placeholder,
    /// Stand-in rendering of a future block; no gameplay effect.
    Preview,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub kind: MarkerKind,
    pub owner: BuildingId,
    /// For previews, the block this marker depicts.
    #[serde(default)]
    pub depicts: Option<BlockId>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VoxelWorld {
    blocks: BTreeMap<VoxelCoord, WorldBlock>,
    markers: BTreeMap<VoxelCoord, Marker>,
    containers: BTreeMap<VoxelCoord, Container>,
    unloaded: BTreeSet<ChunkCoord>,
}

impl VoxelWorld {
    pub fn new() -> Self {
        Self::default()
    }

    // -- chunks ---------------------------------------------------------------

    pub fn is_loaded(&self, pos: VoxelCoord) -> bool {
        !self.unloaded.contains(&pos.chunk())
    }

    pub fn unload_chunk(&mut self, chunk: ChunkCoord) {
        self.unloaded.insert(chunk);
    }

    pub fn load_chunk(&mut self, chunk: ChunkCoord) {
        self.unloaded.remove(&chunk);
    }

    // -- blocks ---------------------------------------------------------------

    /// The block at `pos`, or `None` for air.
    pub fn block(&self, pos: VoxelCoord) -> Option<&WorldBlock> {
        self.blocks.get(&pos)
    }

    pub fn block_id(&self, pos: VoxelCoord) -> BlockId {
        self.blocks
            .get(&pos)
            .map_or_else(BlockId::air, |b| b.block.clone())
    }

    pub fn is_air(&self, pos: VoxelCoord) -> bool {
        self.blocks.get(&pos).is_none_or(|b| b.block.is_air())
    }

    /// Write a block, replacing any marker at the position. Writing air
    /// clears the position.
    pub fn set_block(&mut self, pos: VoxelCoord, block: BlockId, state: BlockState) {
        self.markers.remove(&pos);
        if block.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, WorldBlock::new(block, state));
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    // -- markers --------------------------------------------------------------

    pub fn marker(&self, pos: VoxelCoord) -> Option<&Marker> {
        self.markers.get(&pos)
    }

    /// Place a marker block. The caller decides whether the position is
    /// free; this only refuses to overwrite another marker.
    pub fn place_marker(&mut self, pos: VoxelCoord, marker: Marker, marker_block: &BlockId) -> bool {
        if self.markers.contains_key(&pos) {
            return false;
        }
        self.blocks
            .insert(pos, WorldBlock::new(marker_block.clone(), BlockState::new()));
        self.markers.insert(pos, marker);
        true
    }

    /// Remove a marker if it is still there and still owned by `owner`.
    pub fn clear_marker(&mut self, pos: VoxelCoord, owner: BuildingId, kind: MarkerKind) -> bool {
        match self.markers.get(&pos) {
            Some(m) if m.owner == owner && m.kind == kind => {
                self.markers.remove(&pos);
                self.blocks.remove(&pos);
                true
            }
            _ => false,
        }
    }

    pub fn markers_owned_by(&self, owner: BuildingId) -> impl Iterator<Item = (VoxelCoord, &Marker)> {
        self.markers
            .iter()
            .filter(move |(_, m)| m.owner == owner)
            .map(|(p, m)| (*p, m))
    }

    // -- containers -----------------------------------------------------------

    /// Put a container (and its chest block) at `pos`.
    pub fn add_container(&mut self, pos: VoxelCoord, container: Container) {
        self.markers.remove(&pos);
        self.blocks.insert(
            pos,
            WorldBlock::new(BlockId::new("minecraft:chest"), BlockState::new()),
        );
        self.containers.insert(pos, container);
    }

    pub fn container(&self, pos: VoxelCoord) -> Option<&Container> {
        self.containers.get(&pos)
    }

    pub fn container_mut(&mut self, pos: VoxelCoord) -> Option<&mut Container> {
        self.containers.get_mut(&pos)
    }

    /// Positions of loaded containers within `radius` of `center`, in
    /// position order, at most `limit` of them.
    pub fn containers_near(&self, center: VoxelCoord, radius: i32, limit: usize) -> Vec<VoxelCoord> {
        let r = radius.max(0);
        let r2 = (r as i64) * (r as i64);
        let lo = VoxelCoord::new(center.x - r, i32::MIN, i32::MIN);
        let hi = VoxelCoord::new(center.x + r, i32::MAX, i32::MAX);
        self.containers
            .range(lo..=hi)
            .map(|(p, _)| *p)
            .filter(|p| p.distance_squared(center) <= r2 && self.is_loaded(*p))
            .take(limit)
            .collect()
    }
}
