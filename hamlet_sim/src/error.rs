// Typed failure reasons for construction operations.
//
// Every public mutating operation on `SimState` returns
// `Result<_, BuildError>`. None of these are fatal: the tick loop turns them
// into a failed `CommandResponse` and carries on. `Display` gives the short
// player-facing message; `kind()` gives the stable code the transport layer
// sends alongside it.
//
// See also: `command.rs` for `CommandResponse`, `sim.rs` for the operations
// that produce these.

use crate::building::BuildingStatus;
use crate::types::{BlockId, BuildingId, SettlementId, VoxelCoord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The thing a `NotFound` error failed to find.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Missing {
    Settlement(SettlementId),
    Building(BuildingId),
    Structure(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Settlement(id) => write!(f, "settlement {}", id.0),
            Missing::Building(id) => write!(f, "building {}", id.0),
            Missing::Structure(name) => write!(f, "structure '{name}'"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Could not find {0}.")]
    NotFound(Missing),

    #[error("Cannot change a {from} building to {to}.")]
    InvalidTransition {
        from: BuildingStatus,
        to: BuildingStatus,
    },

    #[error("The building would extend outside the settlement at {pos}.")]
    OutOfBounds { pos: VoxelCoord },

    #[error("The area around {pos} is not loaded.")]
    RegionUnavailable { pos: VoxelCoord },

    #[error("Something is in the way at {pos} ({block}).")]
    Obstructed { pos: VoxelCoord, block: BlockId },

    #[error("The building would overlap another building ({other}).")]
    OverlapsBuilding { other: BuildingId },

    #[error("Not enough materials: {}.", format_missing(.missing))]
    InsufficientMaterials { missing: BTreeMap<BlockId, u32> },

    #[error("Structure '{structure}' could not be loaded: {reason}")]
    StructureLoadFailure { structure: String, reason: String },
}

/// Transport-facing reason codes, one per error family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonKind {
    NotFound,
    InvalidTransition,
    OutOfBounds,
    RegionUnavailable,
    Obstructed,
    OverlapsBuilding,
    InsufficientMaterials,
    StructureLoadFailure,
}

impl BuildError {
    pub fn kind(&self) -> ReasonKind {
        match self {
            BuildError::NotFound(_) => ReasonKind::NotFound,
            BuildError::InvalidTransition { .. } => ReasonKind::InvalidTransition,
            BuildError::OutOfBounds { .. } => ReasonKind::OutOfBounds,
            BuildError::RegionUnavailable { .. } => ReasonKind::RegionUnavailable,
            BuildError::Obstructed { .. } => ReasonKind::Obstructed,
            BuildError::OverlapsBuilding { .. } => ReasonKind::OverlapsBuilding,
            BuildError::InsufficientMaterials { .. } => ReasonKind::InsufficientMaterials,
            BuildError::StructureLoadFailure { .. } => ReasonKind::StructureLoadFailure,
        }
    }

    pub fn structure_load(structure: &str, reason: impl fmt::Display) -> Self {
        BuildError::StructureLoadFailure {
            structure: structure.to_owned(),
            reason: reason.to_string(),
        }
    }
}

fn format_missing(missing: &BTreeMap<BlockId, u32>) -> String {
    missing
        .iter()
        .map(|(item, count)| format!("{count} x {}", item.path()))
        .collect::<Vec<_>>()
        .join(", ")
}
