// Commands that mutate construction state, and the responses they produce.
//
// All external mutations go through `SimCommand`. The sim is a pure function
// `(state, world, commands) -> (new_state, events, responses)`, and commands
// are the input. The transport layer turns player requests into commands and
// sends each `CommandResponse` back to whoever issued it.
//
// A `SimCommand` carries a `player_id`, a `tick` (when to apply), and a
// `SimAction`. Current actions:
// - `FoundSettlement`: create a settlement around an anchor.
// - `ReserveBuilding`: validate a placement and create a RESERVED building.
// - `GatherMaterials`: scan containers for a building's outstanding needs,
//   or (with no building) bulk-extract everything in range.
// - `DepositMaterials`: the worker system handing goods to the bank.
// - `StartConstruction`: consume materials and begin placement.
// - `CancelBuilding`: tear a building down and refund what it still holds.
//
// Status queries are not commands; they read state directly through
// `SimState::query_status`.
//
// See also: `sim.rs` for `apply_command()` which dispatches these,
// `error.rs` for the reason codes carried by failed responses.
//
// **Critical constraint: determinism.** Commands are the sole external input
// to the sim.

use crate::building::BuildingSnapshot;
use crate::error::{BuildError, ReasonKind};
use crate::rotation::Rotation;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// A player-issued command targeting a specific simulation tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimCommand {
    pub player_id: PlayerId,
    pub tick: u64,
    pub action: SimAction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SimAction {
    /// `radius` falls back to the configured default.
    FoundSettlement {
        name: String,
        anchor: VoxelCoord,
        radius: Option<i32>,
    },
    ReserveBuilding {
        settlement_id: SettlementId,
        structure_ref: String,
        position: VoxelCoord,
        rotation: Rotation,
    },
    GatherMaterials {
        settlement_id: SettlementId,
        building_id: Option<BuildingId>,
    },
    DepositMaterials {
        settlement_id: SettlementId,
        item: BlockId,
        count: u32,
    },
    StartConstruction { building_id: BuildingId },
    CancelBuilding { building_id: BuildingId },
}

/// The outcome of one command, in the order commands were applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub player_id: PlayerId,
    pub tick: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonKind>,
    /// Player-facing text; empty on plain success.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<SettlementId>,
}

impl CommandResponse {
    pub fn success(cmd: &SimCommand) -> Self {
        Self {
            player_id: cmd.player_id,
            tick: cmd.tick,
            ok: true,
            reason: None,
            message: String::new(),
            building: None,
            settlement_id: None,
        }
    }

    pub fn failure(cmd: &SimCommand, error: &BuildError) -> Self {
        Self {
            ok: false,
            reason: Some(error.kind()),
            message: error.to_string(),
            ..Self::success(cmd)
        }
    }

    pub fn with_building(mut self, snapshot: BuildingSnapshot) -> Self {
        self.building = Some(snapshot);
        self
    }

    pub fn with_settlement(mut self, id: SettlementId) -> Self {
        self.settlement_id = Some(id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
