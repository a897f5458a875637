// Data-driven construction configuration.
//
// All tunable parameters live in `GameConfig`, loaded from JSON at startup.
// Sim logic never hardcodes budgets, radii, or marker blocks; it reads them
// from here. Every field has a default, so a partial JSON object (or `{}`)
// is a valid config.
//
// Marker blocks (`placeholder_block`, `preview_block`) are what the host
// world renders for reserved footprint corners and preview stand-ins.
// `replaceable_blocks` lists block ids that reservation and marker placement
// treat like air (grass, flowers, snow layers).
//
// See also: `sim.rs` which owns the `GameConfig` as part of `SimState`,
// `validation.rs` and `building.rs` for `is_replaceable`, `scheduler.rs` for
// the per-tick budget.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Replays must use the config the run was started with.

use crate::types::BlockId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Maximum template entries dequeued per building per tick.
    pub placement_budget_per_tick: u32,
    /// Radius (blocks) around the settlement anchor searched for containers
    /// when gathering, and around the building when refunding.
    pub container_scan_radius: i32,
    /// Cap on containers visited by one scan.
    pub max_containers_per_scan: usize,
    /// Radius given to new settlements when the caller does not pick one.
    pub default_settlement_radius: i32,
    /// Unlimited materials: starting construction neither checks nor
    /// consumes the ledger.
    pub creative_mode: bool,
    pub placeholder_block: BlockId,
    pub preview_block: BlockId,
    /// Blocks treated as air by reservation and marker placement.
    pub replaceable_blocks: Vec<BlockId>,
    /// Root directory for on-disk structure templates.
    pub template_dir: Option<PathBuf>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            placement_budget_per_tick: 16,
            container_scan_radius: 16,
            max_containers_per_scan: 256,
            default_settlement_radius: 48,
            creative_mode: false,
            placeholder_block: BlockId::new("hamlet:placeholder"),
            preview_block: BlockId::new("hamlet:preview"),
            replaceable_blocks: [
                "minecraft:short_grass",
                "minecraft:tall_grass",
                "minecraft:fern",
                "minecraft:snow",
                "minecraft:dandelion",
                "minecraft:poppy",
            ]
            .into_iter()
            .map(BlockId::new)
            .collect(),
            template_dir: None,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// True for blocks a reservation may build over.
    pub fn is_replaceable(&self, block: &BlockId) -> bool {
        block.is_air() || self.replaceable_blocks.contains(block)
    }
}
