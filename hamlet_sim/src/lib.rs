// hamlet_sim: settlement construction simulation library.
//
// This crate contains the construction core for player-directed settlement
// building: reserving a footprint, computing and gathering the materials a
// structure needs, and placing its blocks into the world a few at a time
// over many ticks. It has no dependency on any game server or renderer; the
// host feeds it commands and a `VoxelWorld`, and reads back events,
// responses, and dirty settlement records to persist.
//
// Module overview:
// - `sim.rs`:        Top-level SimState, tick loop, command processing, save/load.
// - `settlement.rs`: Settlement aggregate (buildings + material bank) and its persisted records.
// - `building.rs`:   Building status machine, footprint boxes, placeholder/preview markers.
// - `ledger.rs`:     Per-building material ledger and the settlement bank.
// - `scanner.rs`:    Container scanning: targeted gather, bulk extraction, refunds.
// - `scheduler.rs`:  Per-building placement queues with a per-tick budget.
// - `validation.rs`: Placement checks (bounds, residency, obstruction, overlap).
// - `template.rs`:   Structure templates (flat and palette JSON) and the template cache.
// - `rotation.rs`:   The one quarter-turn transform every subsystem shares.
// - `world.rs`:      Sparse block world with chunk residency, markers, and containers.
// - `container.rs`:  Slotted storage inventories.
// - `command.rs`:    SimCommand / SimAction and CommandResponse.
// - `event.rs`:      Narrative SimEvents.
// - `config.rs`:     GameConfig, all tunable parameters.
// - `error.rs`:      BuildError and the ReasonKind codes sent to clients.
// - `prng.rs`:       xoshiro256++ PRNG for deterministic entity IDs.
// - `types.rs`:      VoxelCoord, entity IDs, BlockId, BlockState.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, world, commands) -> (new_state, world', events)`. IDs come from a
// seeded PRNG. No `HashMap` iteration, no system time, no OS entropy. Use
// `BTreeMap` for ordered collections.

pub mod building;
pub mod command;
pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod ledger;
pub mod prng;
pub mod rotation;
pub mod scanner;
pub mod scheduler;
pub mod settlement;
pub mod sim;
pub mod template;
pub mod types;
pub mod validation;
pub mod world;
