// Narrative events emitted by the construction sim.
//
// `SimEvent`s are output only: the host forwards them to players, the UI, or
// a log. Nothing in the sim reads them back. Each carries the tick it was
// emitted on.
//
// Placement runs every tick for every in-progress building, so
// `BlocksPlaced` is emitted once per building per tick that placed at least
// one block, not once per block.
//
// See also: `sim.rs` for where each event is pushed, `command.rs` for the
// per-command responses that accompany them.
//
// **Critical constraint: determinism.** Events are emitted in command order,
// then in building-id order for placement, so replays produce identical
// event streams.

use crate::building::BuildingStatus;
use crate::error::ReasonKind;
use crate::ledger::MaterialMap;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// A narrative event emitted by the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    SettlementFounded {
        settlement_id: SettlementId,
        name: String,
    },
    BuildingReserved {
        settlement_id: SettlementId,
        building_id: BuildingId,
        structure_ref: String,
    },
    /// Materials moved out of containers into the settlement. `building_id`
    /// is `None` for bulk extraction.
    MaterialsGathered {
        settlement_id: SettlementId,
        building_id: Option<BuildingId>,
        found: MaterialMap,
    },
    MaterialsDeposited {
        settlement_id: SettlementId,
        item: BlockId,
        count: u32,
    },
    ConstructionStarted {
        building_id: BuildingId,
    },
    /// Starting failed after materials were consumed; the building is back
    /// in RESERVED with its materials restored.
    ConstructionRolledBack {
        building_id: BuildingId,
        reason: ReasonKind,
    },
    BlocksPlaced {
        building_id: BuildingId,
        count: u32,
        progress: f32,
    },
    BuildingCompleted {
        building_id: BuildingId,
    },
    BuildingCancelled {
        building_id: BuildingId,
        previous_status: BuildingStatus,
        materials_returned: bool,
    },
    /// A placement queue outlived its building and was dropped.
    PlacementAbandoned {
        building_id: BuildingId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::GameRng;

    #[test]
    fn event_serialization_roundtrip() {
        let mut rng = GameRng::new(42);
        let event = SimEvent {
            tick: 7,
            kind: SimEventKind::BuildingCancelled {
                building_id: BuildingId::new(&mut rng),
                previous_status: BuildingStatus::InProgress,
                materials_returned: true,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("IN_PROGRESS"));
        let restored: SimEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }
}
