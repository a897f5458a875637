// Placement scheduler: drives in-progress buildings forward block by block.
//
// Each IN_PROGRESS building has one `PlacementQueue`, seeded from its
// template when construction starts. Every tick, each queue (in building-id
// order) dequeues at most `placement_budget_per_tick` entries. That budget
// is the backpressure mechanism: a tick costs the same whether the
// structure has ten blocks or ten thousand.
//
// Per dequeued entry:
// - An entry whose chunk is unloaded is deferred. Deferred entries go back
//   to the front of the queue in their original order, so a building never
//   completes with blocks missing. Deferrals still count against the budget.
// - Otherwise the block is written with its block state rotated to match
//   the building.
//
// Air entries never enter a queue.
//
// A queue is only driven while its building exists and is IN_PROGRESS; a
// queue whose building vanished or left that state is dropped without
// placing anything. When a queue drains, the building moves to COMPLETED.
//
// `stop` is idempotent. Cancellation calls it first, before any other
// teardown, so no block lands after a building starts tearing down.
//
// The scheduler does not own buildings. `tick` resolves each queue's owner
// through `BuildingLookup`, which the settlement map implements.
//
// **Critical constraint: determinism.** Queues live in a `BTreeMap` keyed by
// building id; iteration order is id order.

use crate::building::{Building, BuildingStatus};
use crate::error::BuildError;
use crate::template::StructureTemplate;
use crate::types::{BlockId, BlockState, BuildingId, SettlementId, VoxelCoord};
use crate::world::VoxelWorld;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Resolves a queue's owner to the live building.
pub trait BuildingLookup {
    fn building_mut(&mut self, settlement: SettlementId, building: BuildingId) -> Option<&mut Building>;
}

impl BuildingLookup for BTreeMap<BuildingId, Building> {
    fn building_mut(&mut self, _settlement: SettlementId, building: BuildingId) -> Option<&mut Building> {
        self.get_mut(&building)
    }
}

/// One block waiting to be placed, already in world space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementEntry {
    pub pos: VoxelCoord,
    pub block: BlockId,
    #[serde(default, skip_serializing_if = "BlockState::is_empty")]
    pub state: BlockState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementQueue {
    pub settlement_id: SettlementId,
    pub building_id: BuildingId,
    entries: VecDeque<PlacementEntry>,
    total: u32,
    placed: u32,
}

impl PlacementQueue {
    /// Build the queue for `building` from its template: non-air entries
    /// only, in template order, rotated into world space.
    pub fn seed(building: &Building, template: &StructureTemplate) -> Self {
        let entries: VecDeque<PlacementEntry> = template
            .world_blocks(building.position, building.rotation)
            .filter(|(_, b)| !b.block.is_air())
            .map(|(pos, b)| PlacementEntry {
                pos,
                block: b.block.clone(),
                state: b.state.rotated(building.rotation),
            })
            .collect();
        let total = entries.len() as u32;
        Self {
            settlement_id: building.settlement_id,
            building_id: building.id,
            entries,
            total,
            placed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn placed(&self) -> u32 {
        self.placed
    }

    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.placed as f32 / self.total as f32
        }
    }

    pub fn peek(&self) -> Option<&PlacementEntry> {
        self.entries.front()
    }
}

/// What one tick did to one building.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueTick {
    pub placed: u32,
    pub deferred: u32,
    pub progress: f32,
    pub completed: bool,
}

/// What one tick did, per building.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub buildings: BTreeMap<BuildingId, QueueTick>,
    /// Queues dropped because their building was gone or no longer
    /// IN_PROGRESS.
    pub discarded: Vec<BuildingId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementScheduler {
    queues: BTreeMap<BuildingId, PlacementQueue>,
}

impl PlacementScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start driving `building`. Replaces any existing queue for it.
    pub fn start(&mut self, building: &Building, template: &StructureTemplate) {
        let queue = PlacementQueue::seed(building, template);
        tracing::debug!(
            building = %building.id,
            blocks = queue.total(),
            "seeded placement queue"
        );
        self.queues.insert(building.id, queue);
    }

    /// Stop driving `building_id`. Returns true if a queue existed.
    pub fn stop(&mut self, building_id: BuildingId) -> bool {
        self.queues.remove(&building_id).is_some()
    }

    pub fn is_active(&self, building_id: BuildingId) -> bool {
        self.queues.contains_key(&building_id)
    }

    pub fn queue(&self, building_id: BuildingId) -> Option<&PlacementQueue> {
        self.queues.get(&building_id)
    }

    pub fn active_count(&self) -> usize {
        self.queues.len()
    }

    /// Advance every queue by up to `budget` entries.
    pub fn tick(
        &mut self,
        world: &mut VoxelWorld,
        budget: u32,
        buildings: &mut impl BuildingLookup,
    ) -> TickReport {
        let mut report = TickReport::default();
        let mut finished = Vec::new();

        for (id, queue) in self.queues.iter_mut() {
            let Some(building) = buildings.building_mut(queue.settlement_id, *id) else {
                report.discarded.push(*id);
                continue;
            };
            if building.status() != BuildingStatus::InProgress {
                report.discarded.push(*id);
                continue;
            }

            let outcome = advance(queue, world, budget);
            building.set_progress(outcome.progress);
            if outcome.completed {
                if let Err(e) = complete(building) {
                    tracing::warn!(building = %id, error = %e, "could not complete building");
                }
                finished.push(*id);
            }
            report.buildings.insert(*id, outcome);
        }

        for id in report.discarded.iter().chain(&finished) {
            self.queues.remove(id);
        }
        if !report.discarded.is_empty() {
            tracing::warn!(count = report.discarded.len(), "discarded orphaned placement queues");
        }
        report
    }
}

fn complete(building: &mut Building) -> Result<(), BuildError> {
    building.transition(BuildingStatus::Completed)?;
    tracing::info!(
        building = %building.id,
        structure = %building.structure_ref,
        "building completed"
    );
    Ok(())
}

fn advance(queue: &mut PlacementQueue, world: &mut VoxelWorld, budget: u32) -> QueueTick {
    let mut tick = QueueTick::default();
    let mut deferred = Vec::new();

    for _ in 0..budget {
        let Some(entry) = queue.entries.pop_front() else {
            break;
        };
        if !world.is_loaded(entry.pos) {
            deferred.push(entry);
            continue;
        }
        world.set_block(entry.pos, entry.block, entry.state);
        queue.placed += 1;
        tick.placed += 1;
    }

    tick.deferred = deferred.len() as u32;
    for entry in deferred.into_iter().rev() {
        queue.entries.push_front(entry);
    }
    tick.progress = queue.progress();
    tick.completed = queue.entries.is_empty();
    tracing::debug!(
        building = %queue.building_id,
        placed = tick.placed,
        deferred = tick.deferred,
        remaining = queue.entries.len(),
        "placement tick"
    );
    tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::GameRng;
    use crate::rotation::Rotation;

    fn line_template(n: usize) -> StructureTemplate {
        let blocks: Vec<String> = (0..n)
            .map(|x| format!(r#"{{ "pos": [{x}, 0, 0], "block": "minecraft:stone" }}"#))
            .collect();
        let json = format!(r#"{{ "size": [{n}, 1, 1], "blocks": [{}] }}"#, blocks.join(","));
        StructureTemplate::from_json("line", &json).unwrap()
    }

    fn by_id(b: Building) -> BTreeMap<BuildingId, Building> {
        BTreeMap::from([(b.id, b)])
    }

    fn started(template: &StructureTemplate, rng: &mut GameRng) -> Building {
        let mut b = Building::reserve(
            BuildingId::new(rng),
            SettlementId::new(rng),
            template,
            VoxelCoord::new(0, 64, 0),
            Rotation::None,
        );
        b.transition(BuildingStatus::InProgress).unwrap();
        b
    }

    #[test]
    fn budget_bounds_each_tick() {
        let mut rng = GameRng::new(11);
        let template = line_template(40);
        let building = started(&template, &mut rng);
        let id = building.id;
        let mut world = VoxelWorld::new();
        let mut sched = PlacementScheduler::new();
        sched.start(&building, &template);
        let mut buildings = by_id(building);

        let mut ticks = 0;
        while sched.is_active(id) {
            let report = sched.tick(&mut world, 16, &mut buildings);
            assert!(report.buildings[&id].placed <= 16);
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert_eq!(world.block_count(), 40);
        assert_eq!(buildings[&id].status(), BuildingStatus::Completed);
        assert_eq!(buildings[&id].progress(), 1.0);
    }

    #[test]
    fn air_is_never_queued() {
        let json = r#"{ "size": [2, 1, 1], "blocks": [
            { "pos": [0, 0, 0], "block": "minecraft:air" },
            { "pos": [1, 0, 0], "block": "minecraft:stone" } ] }"#;
        let template = StructureTemplate::from_json("t", json).unwrap();
        let mut rng = GameRng::new(12);
        let building = started(&template, &mut rng);
        let queue = PlacementQueue::seed(&building, &template);
        assert_eq!(queue.total(), 1);
        assert_eq!(queue.peek().unwrap().pos, VoxelCoord::new(1, 64, 0));
    }

    #[test]
    fn unloaded_entries_are_deferred_in_order() {
        let mut rng = GameRng::new(13);
        let template = line_template(20);
        let building = started(&template, &mut rng);
        let id = building.id;
        let mut world = VoxelWorld::new();
        // x in 16..20 is the next chunk over.
        let far = VoxelCoord::new(16, 64, 0).chunk();
        world.unload_chunk(far);
        let mut sched = PlacementScheduler::new();
        sched.start(&building, &template);
        let mut buildings = by_id(building);

        let r1 = sched.tick(&mut world, 16, &mut buildings);
        assert_eq!(r1.buildings[&id].placed, 16);
        let r2 = sched.tick(&mut world, 16, &mut buildings);
        assert_eq!(r2.buildings[&id].placed, 0);
        assert_eq!(r2.buildings[&id].deferred, 4);
        assert_eq!(
            sched.queue(id).unwrap().peek().unwrap().pos,
            VoxelCoord::new(16, 64, 0)
        );
        assert_eq!(buildings[&id].status(), BuildingStatus::InProgress);

        world.load_chunk(far);
        let r3 = sched.tick(&mut world, 16, &mut buildings);
        assert!(r3.buildings[&id].completed);
        assert_eq!(world.block_count(), 20);
    }

    #[test]
    fn stop_is_idempotent_and_halts_placement() {
        let mut rng = GameRng::new(14);
        let template = line_template(40);
        let building = started(&template, &mut rng);
        let id = building.id;
        let mut world = VoxelWorld::new();
        let mut sched = PlacementScheduler::new();
        sched.start(&building, &template);
        let mut buildings = by_id(building);
        sched.tick(&mut world, 16, &mut buildings);

        assert!(sched.stop(id));
        assert!(!sched.stop(id));
        sched.tick(&mut world, 16, &mut buildings);
        assert_eq!(world.block_count(), 16);
    }

    #[test]
    fn orphaned_queue_is_discarded() {
        let mut rng = GameRng::new(15);
        let template = line_template(4);
        let building = started(&template, &mut rng);
        let id = building.id;
        let mut world = VoxelWorld::new();
        let mut sched = PlacementScheduler::new();
        sched.start(&building, &template);

        let mut nobody = BTreeMap::<BuildingId, Building>::new();
        let report = sched.tick(&mut world, 16, &mut nobody);
        assert_eq!(report.discarded, vec![id]);
        assert!(!sched.is_active(id));
        assert_eq!(world.block_count(), 0);
    }

    #[test]
    fn placed_blocks_carry_rotated_state() {
        let json = r#"{ "size": [1, 1, 1], "blocks": [
            { "pos": [0, 0, 0], "block": "minecraft:oak_stairs", "state": { "facing": "north" } } ] }"#;
        let template = StructureTemplate::from_json("stairs", json).unwrap();
        let mut rng = GameRng::new(16);
        let mut building = Building::reserve(
            BuildingId::new(&mut rng),
            SettlementId::new(&mut rng),
            &template,
            VoxelCoord::new(5, 64, 5),
            Rotation::Clockwise90,
        );
        building.transition(BuildingStatus::InProgress).unwrap();
        let mut world = VoxelWorld::new();
        let mut sched = PlacementScheduler::new();
        sched.start(&building, &template);
        sched.tick(&mut world, 16, &mut by_id(building));

        let placed = world.block(VoxelCoord::new(5, 64, 5)).unwrap();
        assert_eq!(placed.state.get("facing"), Some("east"));
    }
}
