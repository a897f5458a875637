// Placement validation for new reservations.
//
// A proposed (template, anchor, rotation) is checked against the world and
// the settlement's existing buildings before anything is mutated. The
// checks run per template entry, in template order, and the first failure
// wins:
//
// 1. Bounds: the world position lies within the settlement radius of the
//    anchor (spherical, squared distances in i64).
// 2. Residency: the chunk is loaded.
// 3. Obstruction: the world block is air, a replaceable block, or a
//    preview. Another building's placeholder is an overlap with that
//    building. Air template entries place nothing and skip this check.
//
// Then overlap with existing buildings. Footprint bounding boxes are a cheap
// pre-filter; the exact answer comes from intersecting world-position sets.
// If another building's template cannot be loaded, its bounding box is used
// as the authority instead (and a warning is logged), so a broken template
// cannot free up the space it occupies.
//
// Every position goes through `rotation::to_world`, the same transform the
// scheduler places with.
//
// See also: `template.rs` for footprints and world positions,
// `sim.rs::reserve_building` for the caller.

use crate::building::{Aabb, Building, BuildingStatus};
use crate::config::GameConfig;
use crate::error::BuildError;
use crate::rotation::Rotation;
use crate::template::{StructureTemplate, TemplateCache};
use crate::types::VoxelCoord;
use crate::world::{MarkerKind, VoxelWorld};

/// The settlement area a placement must stay inside.
#[derive(Clone, Copy, Debug)]
pub struct Bounds {
    pub center: VoxelCoord,
    pub radius: i32,
}

impl Bounds {
    pub fn contains(&self, pos: VoxelCoord) -> bool {
        let r = self.radius.max(0) as i64;
        pos.distance_squared(self.center) <= r * r
    }
}

/// Per-block checks: bounds, residency, obstruction.
pub fn check_site(
    world: &VoxelWorld,
    config: &GameConfig,
    bounds: Bounds,
    template: &StructureTemplate,
    anchor: VoxelCoord,
    rotation: Rotation,
) -> Result<(), BuildError> {
    for (pos, entry) in template.world_blocks(anchor, rotation) {
        if !bounds.contains(pos) {
            return Err(BuildError::OutOfBounds { pos });
        }
        if !world.is_loaded(pos) {
            return Err(BuildError::RegionUnavailable { pos });
        }
        if entry.block.is_air() {
            continue;
        }
        match world.marker(pos) {
            // A new reservation has no markers yet, so any placeholder is
            // someone else's.
            Some(marker) if marker.kind == MarkerKind::Placeholder => {
                return Err(BuildError::OverlapsBuilding { other: marker.owner });
            }
            Some(_) => {}
            None => {
                let existing = world.block_id(pos);
                if !config.is_replaceable(&existing) {
                    return Err(BuildError::Obstructed { pos, block: existing });
                }
            }
        }
    }
    Ok(())
}

/// Reject placements that share a position with an active building.
pub fn check_overlap<'a>(
    template: &StructureTemplate,
    anchor: VoxelCoord,
    rotation: Rotation,
    existing: impl IntoIterator<Item = &'a Building>,
    templates: &mut TemplateCache,
) -> Result<(), BuildError> {
    let footprint = template.footprint(anchor, rotation);
    let mut positions = None;

    for other in existing {
        if other.status() == BuildingStatus::Cancelled {
            continue;
        }
        match templates.get(&other.structure_ref) {
            Ok(other_template) => {
                let other_box = other_template.footprint(other.position, other.rotation);
                if !footprint.intersects(&other_box) {
                    continue;
                }
                let ours = positions.get_or_insert_with(|| template.world_positions(anchor, rotation));
                let overlaps = other_template
                    .world_blocks(other.position, other.rotation)
                    .any(|(p, b)| !b.block.is_air() && ours.contains(&p));
                if overlaps {
                    return Err(BuildError::OverlapsBuilding { other: other.id });
                }
            }
            Err(e) => {
                tracing::warn!(
                    building = %other.id,
                    structure = %other.structure_ref,
                    error = %e,
                    "template unavailable for overlap check, using reserved corners"
                );
                if other_fallback_box(other).is_some_and(|bb| footprint.intersects(&bb)) {
                    return Err(BuildError::OverlapsBuilding { other: other.id });
                }
            }
        }
    }
    Ok(())
}

/// Without a template, the best record of a building's extent is the box
/// spanned by its placeholder corners, or failing that its anchor.
fn other_fallback_box(other: &Building) -> Option<Aabb> {
    let mut points = other
        .placeholder_positions
        .iter()
        .copied()
        .chain(std::iter::once(other.position));
    let first = points.next()?;
    Some(points.fold(Aabb::from_corners(first, first), |bb, p| {
        Aabb::from_corners(
            VoxelCoord::new(bb.min.x.min(p.x), bb.min.y.min(p.y), bb.min.z.min(p.z)),
            VoxelCoord::new(bb.max.x.max(p.x), bb.max.y.max(p.y), bb.max.z.max(p.z)),
        )
    }))
}

/// Full validation: site checks, then overlap.
#[allow(clippy::too_many_arguments)]
pub fn validate_placement<'a>(
    world: &VoxelWorld,
    config: &GameConfig,
    bounds: Bounds,
    template: &StructureTemplate,
    anchor: VoxelCoord,
    rotation: Rotation,
    existing: impl IntoIterator<Item = &'a Building>,
    templates: &mut TemplateCache,
) -> Result<(), BuildError> {
    check_site(world, config, bounds, template, anchor, rotation)?;
    check_overlap(template, anchor, rotation, existing, templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonKind;
    use crate::prng::GameRng;
    use crate::types::{BlockId, BlockState, BuildingId, SettlementId};
    use crate::world::Marker;

    // An L: two blocks along x, one along z. Its bounding box has empty
    // space that another L can nest into.
    const ELL: &str = r#"{
        "size": [2, 1, 2],
        "blocks": [
            { "pos": [0, 0, 0], "block": "minecraft:stone" },
            { "pos": [1, 0, 0], "block": "minecraft:stone" },
            { "pos": [0, 0, 1], "block": "minecraft:stone" }
        ]
    }"#;

    fn setup() -> (VoxelWorld, GameConfig, Bounds, TemplateCache, StructureTemplate) {
        let mut templates = TemplateCache::new();
        templates.register_json("ell", ELL);
        let t = StructureTemplate::from_json("ell", ELL).unwrap();
        let bounds = Bounds {
            center: VoxelCoord::new(0, 64, 0),
            radius: 10,
        };
        (VoxelWorld::new(), GameConfig::default(), bounds, templates, t)
    }

    #[test]
    fn open_ground_is_valid() {
        let (world, config, bounds, mut templates, t) = setup();
        let anchor = VoxelCoord::new(0, 64, 0);
        for rot in Rotation::ALL {
            validate_placement(&world, &config, bounds, &t, anchor, rot, std::iter::empty::<&Building>(), &mut templates).unwrap();
        }
    }

    #[test]
    fn out_of_bounds() {
        let (world, config, bounds, _, t) = setup();
        let err = check_site(&world, &config, bounds, &t, VoxelCoord::new(10, 64, 0), Rotation::None)
            .unwrap_err();
        assert_eq!(err, BuildError::OutOfBounds { pos: VoxelCoord::new(11, 64, 0) });
    }

    #[test]
    fn unloaded_chunk_is_unavailable() {
        let (mut world, config, bounds, _, t) = setup();
        world.unload_chunk(VoxelCoord::new(0, 64, 0).chunk());
        let err = check_site(&world, &config, bounds, &t, VoxelCoord::new(0, 64, 0), Rotation::None)
            .unwrap_err();
        assert_eq!(err.kind(), ReasonKind::RegionUnavailable);
    }

    #[test]
    fn solid_blocks_obstruct_but_grass_does_not() {
        let (mut world, config, bounds, _, t) = setup();
        let anchor = VoxelCoord::new(0, 64, 0);
        world.set_block(VoxelCoord::new(1, 64, 0), BlockId::new("minecraft:short_grass"), BlockState::new());
        check_site(&world, &config, bounds, &t, anchor, Rotation::None).unwrap();

        world.set_block(VoxelCoord::new(0, 64, 1), BlockId::new("minecraft:oak_log"), BlockState::new());
        let err = check_site(&world, &config, bounds, &t, anchor, Rotation::None).unwrap_err();
        assert_eq!(
            err,
            BuildError::Obstructed {
                pos: VoxelCoord::new(0, 64, 1),
                block: BlockId::new("minecraft:oak_log"),
            }
        );
    }

    #[test]
    fn overlap_uses_exact_positions() {
        let (_, _, _, mut templates, t) = setup();
        let mut rng = GameRng::new(3);
        let settlement = SettlementId::new(&mut rng);
        let existing = Building::reserve(
            BuildingId::new(&mut rng),
            settlement,
            &t,
            VoxelCoord::new(0, 64, 0),
            Rotation::None,
        );

        // Anchored on the empty corner of the first L: the boxes intersect
        // but no position is shared.
        let nested = VoxelCoord::new(1, 64, 1);
        check_overlap(&t, nested, Rotation::None, [&existing], &mut templates).unwrap();

        let err = check_overlap(&t, VoxelCoord::new(0, 64, 1), Rotation::None, [&existing], &mut templates)
            .unwrap_err();
        assert_eq!(err, BuildError::OverlapsBuilding { other: existing.id });
    }

    #[test]
    fn unloadable_neighbour_falls_back_to_its_corners() {
        let (_, _, _, mut templates, t) = setup();
        let mut rng = GameRng::new(4);
        let mut existing = Building::reserve(
            BuildingId::new(&mut rng),
            SettlementId::new(&mut rng),
            &t,
            VoxelCoord::new(0, 64, 0),
            Rotation::None,
        );
        existing.placeholder_positions.push(VoxelCoord::new(0, 64, 0));
        existing.placeholder_positions.push(VoxelCoord::new(1, 64, 1));
        existing.structure_ref = "gone".into();

        let err = check_overlap(&t, VoxelCoord::new(1, 64, 1), Rotation::None, [&existing], &mut templates)
            .unwrap_err();
        assert_eq!(err.kind(), ReasonKind::OverlapsBuilding);
        check_overlap(&t, VoxelCoord::new(2, 64, 0), Rotation::None, [&existing], &mut templates).unwrap();
    }

    #[test]
    fn air_entries_still_count_for_bounds() {
        let (world, config, bounds, _, _) = setup();
        let post = StructureTemplate::from_json(
            "post",
            r#"{
                "size": [2, 1, 1],
                "blocks": [
                    { "pos": [0, 0, 0], "block": "minecraft:stone" },
                    { "pos": [1, 0, 0], "block": "minecraft:air" }
                ]
            }"#,
        )
        .unwrap();
        check_site(&world, &config, bounds, &post, VoxelCoord::new(9, 64, 0), Rotation::None).unwrap();
        let err = check_site(&world, &config, bounds, &post, VoxelCoord::new(10, 64, 0), Rotation::None)
            .unwrap_err();
        assert_eq!(err, BuildError::OutOfBounds { pos: VoxelCoord::new(11, 64, 0) });
    }

    #[test]
    fn placeholder_marks_its_owner_but_preview_does_not_obstruct() {
        let (mut world, config, bounds, _, t) = setup();
        let mut rng = GameRng::new(5);
        let owner = BuildingId::new(&mut rng);
        let anchor = VoxelCoord::new(0, 64, 0);

        let preview = Marker {
            kind: MarkerKind::Preview,
            owner,
            depicts: Some(BlockId::new("minecraft:stone")),
        };
        assert!(world.place_marker(VoxelCoord::new(1, 64, 0), preview, &config.preview_block));
        check_site(&world, &config, bounds, &t, anchor, Rotation::None).unwrap();

        let placeholder = Marker {
            kind: MarkerKind::Placeholder,
            owner,
            depicts: None,
        };
        assert!(world.place_marker(VoxelCoord::new(0, 64, 1), placeholder, &config.placeholder_block));
        let err = check_site(&world, &config, bounds, &t, anchor, Rotation::None).unwrap_err();
        assert_eq!(err, BuildError::OverlapsBuilding { other: owner });
    }
}
