// The canonical structure rotation transform.
//
// Every subsystem that turns a template-relative position into a world
// position goes through `rotate()` (or `Rotation::apply`): placement
// validation, marker placement, material scanning footprints, block-state
// orientation, and the placement scheduler. There is exactly one formula.
//
// Rotations are clockwise when viewed from above (+Y looking down):
//   0°:   (x, y, z) -> ( x, y,  z)
//   90°:  (x, y, z) -> (-z, y,  x)
//   180°: (x, y, z) -> (-x, y, -z)
//   270°: (x, y, z) -> ( z, y, -x)
//
// Arbitrary integer degrees are normalized with `((r % 360) + 360) % 360`
// and then snapped down to the nearest multiple of 90.
//
// See also: `template.rs` for `StructureTemplate::world_blocks`, which pairs
// this transform with the building anchor, `types.rs` for `BlockState`
// orientation handling.

use crate::types::VoxelCoord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A quarter-turn rotation about the Y axis. Serialized as its degree value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Clockwise90,
        Rotation::Clockwise180,
        Rotation::Clockwise270,
    ];

    /// Normalize any integer degree value into a rotation.
    pub fn from_degrees(degrees: i32) -> Self {
        let normalized = ((degrees % 360) + 360) % 360;
        match normalized / 90 {
            0 => Self::None,
            1 => Self::Clockwise90,
            2 => Self::Clockwise180,
            _ => Self::Clockwise270,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Clockwise180 => 180,
            Self::Clockwise270 => 270,
        }
    }

    /// Quarter turns swap the X and Z extents of a footprint.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Clockwise90 | Self::Clockwise270)
    }

    /// Apply the rotation to a template-relative position.
    pub fn apply(self, pos: VoxelCoord) -> VoxelCoord {
        let VoxelCoord { x, y, z } = pos;
        match self {
            Self::None => pos,
            Self::Clockwise90 => VoxelCoord::new(-z, y, x),
            Self::Clockwise180 => VoxelCoord::new(-x, y, -z),
            Self::Clockwise270 => VoxelCoord::new(z, y, -x),
        }
    }

    /// Compose two rotations (apply `self`, then `other`).
    pub fn then(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees())
    }
}

impl From<i32> for Rotation {
    fn from(degrees: i32) -> Self {
        Self::from_degrees(degrees)
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Rotate a template-relative position.
pub fn rotate(pos: VoxelCoord, rotation: Rotation) -> VoxelCoord {
    rotation.apply(pos)
}

/// World position of a template-relative block for a building anchored at
/// `anchor` with the given rotation.
pub fn to_world(relative: VoxelCoord, rotation: Rotation, anchor: VoxelCoord) -> VoxelCoord {
    rotate(relative, rotation).offset(anchor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_positions() -> Vec<VoxelCoord> {
        let mut out = Vec::new();
        for x in -3..=3 {
            for y in -2..=2 {
                for z in -3..=3 {
                    out.push(VoxelCoord::new(x * 7, y, z * 5 + 1));
                }
            }
        }
        out.push(VoxelCoord::new(i32::MAX / 2, 64, i32::MIN / 2));
        out
    }

    #[test]
    fn zero_is_identity() {
        for p in sample_positions() {
            assert_eq!(rotate(p, Rotation::None), p);
        }
    }

    #[test]
    fn four_quarter_turns_round_trip() {
        for p in sample_positions() {
            let mut q = p;
            for _ in 0..4 {
                q = rotate(q, Rotation::Clockwise90);
            }
            assert_eq!(q, p);
        }
    }

    #[test]
    fn quarter_turn_formulas() {
        let p = VoxelCoord::new(1, 2, 3);
        assert_eq!(rotate(p, Rotation::Clockwise90), VoxelCoord::new(-3, 2, 1));
        assert_eq!(rotate(p, Rotation::Clockwise180), VoxelCoord::new(-1, 2, -3));
        assert_eq!(rotate(p, Rotation::Clockwise270), VoxelCoord::new(3, 2, -1));
    }

    #[test]
    fn composition_matches_single_rotation() {
        for p in sample_positions() {
            for a in Rotation::ALL {
                for b in Rotation::ALL {
                    assert_eq!(rotate(rotate(p, a), b), rotate(p, a.then(b)));
                }
            }
        }
    }

    #[test]
    fn degrees_normalize_and_snap_down() {
        assert_eq!(Rotation::from_degrees(0), Rotation::None);
        assert_eq!(Rotation::from_degrees(89), Rotation::None);
        assert_eq!(Rotation::from_degrees(90), Rotation::Clockwise90);
        assert_eq!(Rotation::from_degrees(179), Rotation::Clockwise90);
        assert_eq!(Rotation::from_degrees(450), Rotation::Clockwise90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Clockwise270);
        assert_eq!(Rotation::from_degrees(-1), Rotation::Clockwise270);
        assert_eq!(Rotation::from_degrees(-360), Rotation::None);
    }

    #[test]
    fn serializes_as_degrees() {
        let json = serde_json::to_string(&Rotation::Clockwise180).unwrap();
        assert_eq!(json, "180");
        let restored: Rotation = serde_json::from_str("-90").unwrap();
        assert_eq!(restored, Rotation::Clockwise270);
    }
}
