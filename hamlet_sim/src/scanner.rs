// Container scanning: moving materials between world storage and the
// settlement's books.
//
// Three operations, all bounded by `container_scan_radius` and
// `max_containers_per_scan`, all visiting containers in position order:
//
// - `gather_for_building`: extract only what a building still needs. For
//   each slot, the amount taken is
//     min(stack, max(0, required - provided - banked - found_this_scan))
//   so neither earlier gathers nor earlier slots in the same pass cause
//   over-extraction. Finds go into the bank and are then earmarked for the
//   building (see `MaterialLedger::draw_from_bank`).
// - `extract_all`: the bulk path with no target building. Empties every
//   container in range into the bank. Kept separate so per-building gathers
//   can never fall into it by accident.
// - `return_to_containers`: the refund path. Inserts materials into nearby
//   containers, and whatever does not fit goes to the bank. Nothing is
//   dropped.
//
// See also: `ledger.rs` for the ledger and bank, `container.rs` for slot
// operations, `sim.rs` for the command handlers that call these.

use crate::config::GameConfig;
use crate::ledger::{MaterialBank, MaterialLedger, MaterialMap};
use crate::types::{BlockId, VoxelCoord};
use crate::world::VoxelWorld;

/// What one gather or extraction pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatherReport {
    pub containers_visited: usize,
    /// Taken out of containers and added to the bank.
    pub extracted: MaterialMap,
    /// Moved from the bank into the building's provided materials.
    pub allocated: MaterialMap,
}

/// Where refunded materials ended up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefundReport {
    pub to_containers: MaterialMap,
    pub to_bank: MaterialMap,
}

impl RefundReport {
    pub fn is_empty(&self) -> bool {
        self.to_containers.is_empty() && self.to_bank.is_empty()
    }
}

fn add(map: &mut MaterialMap, item: &BlockId, count: u32) {
    if count > 0 {
        *map.entry(item.clone()).or_insert(0) += count;
    }
}

/// Extract what `ledger` still needs from containers around `center`, bank
/// it, then earmark it for the building.
pub fn gather_for_building(
    world: &mut VoxelWorld,
    center: VoxelCoord,
    config: &GameConfig,
    ledger: &mut MaterialLedger,
    bank: &mut MaterialBank,
) -> GatherReport {
    let mut report = GatherReport::default();
    let targets = world.containers_near(
        center,
        config.container_scan_radius,
        config.max_containers_per_scan,
    );
    report.containers_visited = targets.len();

    for pos in targets {
        let Some(container) = world.container_mut(pos) else {
            continue;
        };
        for index in 0..container.slot_count() {
            let Some(stack) = container.slot(index) else {
                continue;
            };
            let item = stack.item.clone();
            let found = report.extracted.get(&item).copied().unwrap_or(0);
            let still_needed = ledger
                .outstanding_of(&item)
                .saturating_sub(bank.count(&item))
                .saturating_sub(found);
            if still_needed == 0 {
                continue;
            }
            let taken = container.take_from_slot(index, still_needed);
            add(&mut report.extracted, &item, taken);
        }
    }

    bank.merge(&report.extracted);
    report.allocated = ledger.draw_from_bank(bank);
    tracing::debug!(
        containers = report.containers_visited,
        extracted = report.extracted.values().sum::<u32>(),
        allocated = report.allocated.values().sum::<u32>(),
        "gathered materials for building"
    );
    report
}

/// Empty every container in range into the bank.
pub fn extract_all(
    world: &mut VoxelWorld,
    center: VoxelCoord,
    config: &GameConfig,
    bank: &mut MaterialBank,
) -> GatherReport {
    let mut report = GatherReport::default();
    let targets = world.containers_near(
        center,
        config.container_scan_radius,
        config.max_containers_per_scan,
    );
    report.containers_visited = targets.len();

    for pos in targets {
        let Some(container) = world.container_mut(pos) else {
            continue;
        };
        for index in 0..container.slot_count() {
            let Some(stack) = container.slot(index) else {
                continue;
            };
            let item = stack.item.clone();
            let taken = container.take_from_slot(index, u32::MAX);
            add(&mut report.extracted, &item, taken);
        }
    }

    bank.merge(&report.extracted);
    tracing::debug!(
        containers = report.containers_visited,
        extracted = report.extracted.values().sum::<u32>(),
        "bulk extraction"
    );
    report
}

/// Put `materials` into containers around `center`, banking the overflow.
pub fn return_to_containers(
    world: &mut VoxelWorld,
    center: VoxelCoord,
    config: &GameConfig,
    materials: MaterialMap,
    bank: &mut MaterialBank,
) -> RefundReport {
    let mut report = RefundReport::default();
    let targets = world.containers_near(
        center,
        config.container_scan_radius,
        config.max_containers_per_scan,
    );

    for (item, count) in materials {
        let mut remaining = count;
        for pos in &targets {
            if remaining == 0 {
                break;
            }
            if let Some(container) = world.container_mut(*pos) {
                let overflow = container.insert(&item, remaining);
                add(&mut report.to_containers, &item, remaining - overflow);
                remaining = overflow;
            }
        }
        if remaining > 0 {
            bank.add(&item, remaining);
            add(&mut report.to_bank, &item, remaining);
        }
    }
    report
}
