// Core simulation state and tick loop for settlement construction.
//
// `SimState` is the single source of truth for construction: every
// settlement (and through them every building and material bank), the
// placement scheduler, the PRNG, the config, and the template cache. The
// host world is not owned here; each operation that touches blocks or
// containers takes `&mut VoxelWorld`.
//
// The sim is a pure function:
// `(state, world, commands) -> (new_state, world', events, responses)`.
//
// ## Building lifecycle
//
// 1. `reserve_building`: load the template, validate the placement (see
//    `validation.rs`), create a RESERVED building with a ledger computed
//    from the template, and put placeholder and preview markers into the
//    world.
// 2. `gather_materials`: scan containers around the settlement anchor for
//    what the building still needs (see `scanner.rs`). With no building,
//    falls through to `extract_all_materials`, the bulk path.
// 3. `start_construction`: check affordability, consume the ledger, load
//    the template, clear markers, move to IN_PROGRESS, seed the scheduler.
// 4. Each tick, the scheduler places up to the configured budget of blocks
//    per building. An empty queue moves the building to COMPLETED.
// 5. `cancel_building` at any point before COMPLETED: halt the scheduler,
//    clear markers, refund provided materials, mark CANCELLED, remove the
//    building, mark the settlement dirty. In that order.
//
// ## Start failure and rollback
//
// Every check that can fail before materials are consumed runs first, so a
// failed start leaves the building untouched. The one step that can fail
// after consumption is loading the template to seed the queue; that path
// restores the ledger and bank from the consumption receipt, logs a
// warning, and reports `StructureLoadFailure` with the building still
// RESERVED.
//
// ## Concurrency
//
// All mutation goes through `&mut SimState`; two racing starts for the same
// building are serialized by the borrow checker, and the second one fails
// the status check.
//
// See also: `command.rs` for the command set, `event.rs` for emitted events,
// `settlement.rs` for persistence records.
//
// **Critical constraint: determinism.** All IDs come from the seeded
// `GameRng`. All collections are `BTreeMap`s. Commands apply in slice order.

use crate::building::{Building, BuildingSnapshot, BuildingStatus};
use crate::command::{CommandResponse, SimAction, SimCommand};
use crate::config::GameConfig;
use crate::error::{BuildError, Missing};
use crate::event::{SimEvent, SimEventKind};
use crate::ledger::MaterialMap;
use crate::prng::GameRng;
use crate::rotation::Rotation;
use crate::scanner::{self, GatherReport, RefundReport};
use crate::scheduler::{PlacementScheduler, TickReport};
use crate::settlement::{Settlement, SettlementRecord};
use crate::template::TemplateCache;
use crate::types::*;
use crate::validation;
use crate::world::VoxelWorld;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level construction state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimState {
    /// Current simulation tick.
    pub tick: u64,

    /// The simulation's deterministic PRNG.
    pub rng: GameRng,

    /// Game configuration (immutable after initialization).
    pub config: GameConfig,

    /// All settlements, keyed by ID.
    pub settlements: BTreeMap<SettlementId, Settlement>,

    /// In-flight placement queues. Persisted so construction resumes after a
    /// restart.
    #[serde(default)]
    pub scheduler: PlacementScheduler,

    /// Template sources and parses. Not serialized; supplied again on load.
    #[serde(skip)]
    pub templates: TemplateCache,
}

/// What `cancel_building` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelOutcome {
    pub previous_status: BuildingStatus,
    pub materials_returned: bool,
    pub refund: RefundReport,
    pub markers_cleared: usize,
}

/// The result of processing commands and advancing the simulation.
pub struct StepResult {
    /// Narrative events emitted during this step.
    pub events: Vec<SimEvent>,
    /// One response per applied command, in application order.
    pub responses: Vec<CommandResponse>,
}

impl SimState {
    /// Create a new simulation with default config and the given seed.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, GameConfig::default())
    }

    pub fn with_config(seed: u64, config: GameConfig) -> Self {
        let templates = match &config.template_dir {
            Some(dir) => TemplateCache::with_root(dir),
            None => TemplateCache::new(),
        };
        Self {
            tick: 0,
            rng: GameRng::new(seed),
            config,
            settlements: BTreeMap::new(),
            scheduler: PlacementScheduler::new(),
            templates,
        }
    }

    // -----------------------------------------------------------------------
    // Settlements
    // -----------------------------------------------------------------------

    /// Create a settlement. `radius` defaults to the configured value and is
    /// clamped to at least 1.
    pub fn found_settlement(&mut self, name: &str, anchor: VoxelCoord, radius: Option<i32>) -> SettlementId {
        let id = SettlementId::new(&mut self.rng);
        let radius = radius.unwrap_or(self.config.default_settlement_radius);
        let settlement = Settlement::new(id, name, anchor, radius);
        tracing::info!(settlement = %id, name, %anchor, radius = settlement.radius(), "settlement founded");
        self.settlements.insert(id, settlement);
        id
    }

    pub fn settlement(&self, id: SettlementId) -> Option<&Settlement> {
        self.settlements.get(&id)
    }

    fn settlement_mut(&mut self, id: SettlementId) -> Result<&mut Settlement, BuildError> {
        self.settlements
            .get_mut(&id)
            .ok_or(BuildError::NotFound(Missing::Settlement(id)))
    }

    /// The settlement that owns `building_id`.
    pub fn find_building(&self, building_id: BuildingId) -> Option<SettlementId> {
        self.settlements
            .values()
            .find(|s| s.building(building_id).is_some())
            .map(|s| s.id)
    }

    fn locate(&self, building_id: BuildingId) -> Result<SettlementId, BuildError> {
        self.find_building(building_id)
            .ok_or(BuildError::NotFound(Missing::Building(building_id)))
    }

    /// Records for every settlement changed since the last call, clearing
    /// their dirty flags.
    pub fn take_dirty_settlements(&mut self) -> Vec<SettlementRecord> {
        self.settlements
            .values_mut()
            .filter_map(|s| s.take_dirty().then(|| s.to_record()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Building operations
    // -----------------------------------------------------------------------

    /// Validate a placement and create a RESERVED building.
    pub fn reserve_building(
        &mut self,
        world: &mut VoxelWorld,
        settlement_id: SettlementId,
        structure_ref: &str,
        position: VoxelCoord,
        rotation: Rotation,
    ) -> Result<BuildingSnapshot, BuildError> {
        if !self.settlements.contains_key(&settlement_id) {
            return Err(BuildError::NotFound(Missing::Settlement(settlement_id)));
        }
        let template = self.templates.get(structure_ref)?;
        let settlement = self
            .settlements
            .get_mut(&settlement_id)
            .ok_or(BuildError::NotFound(Missing::Settlement(settlement_id)))?;

        validation::validate_placement(
            world,
            &self.config,
            settlement.bounds(),
            &template,
            position,
            rotation,
            settlement.buildings(),
            &mut self.templates,
        )?;

        let id = BuildingId::new(&mut self.rng);
        let mut building = Building::reserve(id, settlement_id, &template, position, rotation);
        let footprint = template.footprint(position, rotation);
        building.place_previews(world, &template, &self.config);
        building.place_placeholders(world, &footprint, &self.config);

        tracing::info!(
            settlement = %settlement_id,
            building = %id,
            structure = structure_ref,
            %position,
            %rotation,
            "building reserved"
        );
        let snapshot = building.snapshot();
        settlement.insert_building(building);
        Ok(snapshot)
    }

    /// Scan containers for what `building_id` still needs. With no
    /// building, performs bulk extraction instead.
    pub fn gather_materials(
        &mut self,
        world: &mut VoxelWorld,
        settlement_id: SettlementId,
        building_id: Option<BuildingId>,
    ) -> Result<GatherReport, BuildError> {
        let Some(building_id) = building_id else {
            return self.extract_all_materials(world, settlement_id);
        };
        let config = &self.config;
        let settlement = self
            .settlements
            .get_mut(&settlement_id)
            .ok_or(BuildError::NotFound(Missing::Settlement(settlement_id)))?;
        let anchor = settlement.anchor;
        let (building, bank) = settlement
            .building_and_bank_mut(building_id)
            .ok_or(BuildError::NotFound(Missing::Building(building_id)))?;
        Ok(scanner::gather_for_building(
            world,
            anchor,
            config,
            &mut building.ledger,
            bank,
        ))
    }

    /// Bulk path: move every item in range of the settlement anchor into
    /// the bank, regardless of what any building needs.
    pub fn extract_all_materials(
        &mut self,
        world: &mut VoxelWorld,
        settlement_id: SettlementId,
    ) -> Result<GatherReport, BuildError> {
        let config = &self.config;
        let settlement = self
            .settlements
            .get_mut(&settlement_id)
            .ok_or(BuildError::NotFound(Missing::Settlement(settlement_id)))?;
        let anchor = settlement.anchor;
        Ok(scanner::extract_all(world, anchor, config, settlement.bank_mut()))
    }

    /// Hand goods to a settlement's bank (the worker system's entry point).
    pub fn deposit_materials(
        &mut self,
        settlement_id: SettlementId,
        item: &BlockId,
        count: u32,
    ) -> Result<(), BuildError> {
        self.settlement_mut(settlement_id)?.deposit(item, count);
        Ok(())
    }

    /// Consume materials and begin placement.
    pub fn start_construction(
        &mut self,
        world: &mut VoxelWorld,
        building_id: BuildingId,
    ) -> Result<BuildingSnapshot, BuildError> {
        let settlement_id = self.locate(building_id)?;
        let creative = self.config.creative_mode;
        let settlement = self
            .settlements
            .get_mut(&settlement_id)
            .ok_or(BuildError::NotFound(Missing::Settlement(settlement_id)))?;
        let (building, bank) = settlement
            .building_and_bank_mut(building_id)
            .ok_or(BuildError::NotFound(Missing::Building(building_id)))?;

        if building.status() != BuildingStatus::Reserved {
            return Err(BuildError::InvalidTransition {
                from: building.status(),
                to: BuildingStatus::InProgress,
            });
        }

        let receipt = if creative {
            building.ledger.waive(bank)
        } else {
            building
                .ledger
                .consume(bank)
                .map_err(|missing| BuildError::InsufficientMaterials { missing })?
        };

        let template = match self.templates.get(&building.structure_ref) {
            Ok(t) => t,
            Err(e) => {
                building.ledger.restore(receipt, bank);
                tracing::warn!(
                    building = %building_id,
                    structure = %building.structure_ref,
                    error = %e,
                    "template failed to load after consumption, rolled back to reserved"
                );
                return Err(match e {
                    BuildError::StructureLoadFailure { .. } => e,
                    other => BuildError::structure_load(&building.structure_ref, other),
                });
            }
        };

        building.clear_markers(world);
        building.transition(BuildingStatus::InProgress)?;
        self.scheduler.start(building, &template);
        tracing::info!(
            building = %building_id,
            structure = %building.structure_ref,
            creative,
            "construction started"
        );
        Ok(building.snapshot())
    }

    /// Tear a building down. Returns what happened to its materials.
    pub fn cancel_building(
        &mut self,
        world: &mut VoxelWorld,
        building_id: BuildingId,
    ) -> Result<CancelOutcome, BuildError> {
        let settlement_id = self.locate(building_id)?;
        let config = &self.config;
        let settlement = self
            .settlements
            .get_mut(&settlement_id)
            .ok_or(BuildError::NotFound(Missing::Settlement(settlement_id)))?;
        let previous_status = settlement
            .building(building_id)
            .map(|b| b.status())
            .ok_or(BuildError::NotFound(Missing::Building(building_id)))?;
        if !previous_status.can_transition(BuildingStatus::Cancelled) {
            return Err(BuildError::InvalidTransition {
                from: previous_status,
                to: BuildingStatus::Cancelled,
            });
        }

        // Halt placement before any teardown.
        self.scheduler.stop(building_id);

        let (building, bank) = settlement
            .building_and_bank_mut(building_id)
            .ok_or(BuildError::NotFound(Missing::Building(building_id)))?;
        let markers_cleared = building.clear_markers(world);
        let provided = building.ledger.take_provided();
        let refund = scanner::return_to_containers(world, building.position, config, provided, bank);
        building.transition(BuildingStatus::Cancelled)?;

        settlement.remove_building(building_id);
        settlement.mark_dirty();

        let materials_returned = !refund.is_empty();
        tracing::info!(
            building = %building_id,
            from = %previous_status,
            materials_returned,
            "building cancelled"
        );
        Ok(CancelOutcome {
            previous_status,
            materials_returned,
            refund,
            markers_cleared,
        })
    }

    /// Read-only view of a building.
    pub fn query_status(&self, building_id: BuildingId) -> Result<BuildingSnapshot, BuildError> {
        self.settlements
            .values()
            .find_map(|s| s.building(building_id))
            .map(|b| b.snapshot())
            .ok_or(BuildError::NotFound(Missing::Building(building_id)))
    }

    /// Run one round of placement for every in-progress building.
    pub fn run_placement(&mut self, world: &mut VoxelWorld) -> TickReport {
        self.scheduler.tick(
            world,
            self.config.placement_budget_per_tick,
            &mut self.settlements,
        )
    }

    // -----------------------------------------------------------------------
    // Tick loop
    // -----------------------------------------------------------------------

    /// Apply a batch of commands and advance the sim to the target tick.
    ///
    /// Each tick applies the commands due at or before it, then runs
    /// placement. Commands must be sorted by tick; commands with
    /// tick > `target_tick` are ignored (caller error).
    pub fn step(&mut self, world: &mut VoxelWorld, commands: &[SimCommand], target_tick: u64) -> StepResult {
        let mut events = Vec::new();
        let mut responses = Vec::new();
        let mut cmd_idx = 0;

        while self.tick < target_tick {
            self.tick += 1;

            while cmd_idx < commands.len() && commands[cmd_idx].tick <= self.tick {
                let cmd = &commands[cmd_idx];
                cmd_idx += 1;
                let response = self.apply_command(world, cmd, &mut events);
                responses.push(response);
            }

            let report = self.run_placement(world);
            self.emit_placement_events(&report, &mut events);
        }

        tracing::debug!(
            tick = self.tick,
            commands = responses.len(),
            events = events.len(),
            queues = self.scheduler.active_count(),
            "step complete"
        );
        StepResult { events, responses }
    }

    fn emit_placement_events(&self, report: &TickReport, events: &mut Vec<SimEvent>) {
        for (building_id, outcome) in &report.buildings {
            if outcome.placed > 0 {
                events.push(SimEvent {
                    tick: self.tick,
                    kind: SimEventKind::BlocksPlaced {
                        building_id: *building_id,
                        count: outcome.placed,
                        progress: outcome.progress,
                    },
                });
            }
            if outcome.completed {
                events.push(SimEvent {
                    tick: self.tick,
                    kind: SimEventKind::BuildingCompleted {
                        building_id: *building_id,
                    },
                });
            }
        }
        for building_id in &report.discarded {
            events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::PlacementAbandoned {
                    building_id: *building_id,
                },
            });
        }
    }

    /// Apply a single command. Failures become failed responses; nothing
    /// here aborts the tick.
    fn apply_command(
        &mut self,
        world: &mut VoxelWorld,
        cmd: &SimCommand,
        events: &mut Vec<SimEvent>,
    ) -> CommandResponse {
        let tick = self.tick;
        let mut emit = |kind| events.push(SimEvent { tick, kind });

        let result = match &cmd.action {
            SimAction::FoundSettlement {
                name,
                anchor,
                radius,
            } => {
                let id = self.found_settlement(name, *anchor, *radius);
                emit(SimEventKind::SettlementFounded {
                    settlement_id: id,
                    name: name.clone(),
                });
                Ok(CommandResponse::success(cmd).with_settlement(id))
            }
            SimAction::ReserveBuilding {
                settlement_id,
                structure_ref,
                position,
                rotation,
            } => self
                .reserve_building(world, *settlement_id, structure_ref, *position, *rotation)
                .map(|snapshot| {
                    emit(SimEventKind::BuildingReserved {
                        settlement_id: *settlement_id,
                        building_id: snapshot.id,
                        structure_ref: structure_ref.clone(),
                    });
                    CommandResponse::success(cmd).with_building(snapshot)
                }),
            SimAction::GatherMaterials {
                settlement_id,
                building_id,
            } => self
                .gather_materials(world, *settlement_id, *building_id)
                .map(|report| {
                    let found = report.extracted;
                    let message = describe(&found);
                    emit(SimEventKind::MaterialsGathered {
                        settlement_id: *settlement_id,
                        building_id: *building_id,
                        found,
                    });
                    let response = CommandResponse::success(cmd)
                        .with_settlement(*settlement_id)
                        .with_message(message);
                    match building_id.and_then(|id| self.query_status(id).ok()) {
                        Some(snapshot) => response.with_building(snapshot),
                        None => response,
                    }
                }),
            SimAction::DepositMaterials {
                settlement_id,
                item,
                count,
            } => self
                .deposit_materials(*settlement_id, item, *count)
                .map(|()| {
                    emit(SimEventKind::MaterialsDeposited {
                        settlement_id: *settlement_id,
                        item: item.clone(),
                        count: *count,
                    });
                    CommandResponse::success(cmd).with_settlement(*settlement_id)
                }),
            SimAction::StartConstruction { building_id } => {
                match self.start_construction(world, *building_id) {
                    Ok(snapshot) => {
                        emit(SimEventKind::ConstructionStarted {
                            building_id: *building_id,
                        });
                        Ok(CommandResponse::success(cmd).with_building(snapshot))
                    }
                    Err(e) => {
                        if matches!(e, BuildError::StructureLoadFailure { .. }) {
                            emit(SimEventKind::ConstructionRolledBack {
                                building_id: *building_id,
                                reason: e.kind(),
                            });
                        }
                        Err(e)
                    }
                }
            }
            SimAction::CancelBuilding { building_id } => self
                .cancel_building(world, *building_id)
                .map(|outcome| {
                    emit(SimEventKind::BuildingCancelled {
                        building_id: *building_id,
                        previous_status: outcome.previous_status,
                        materials_returned: outcome.materials_returned,
                    });
                    let message = if outcome.materials_returned {
                        "Materials were returned."
                    } else {
                        ""
                    };
                    CommandResponse::success(cmd).with_message(message)
                }),
        };

        result.unwrap_or_else(|e| {
            tracing::debug!(player = %cmd.player_id, error = %e, "command rejected");
            CommandResponse::failure(cmd, &e)
        })
    }

    // -----------------------------------------------------------------------
    // Save / load
    // -----------------------------------------------------------------------

    /// Serialize the simulation state to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a simulation state. Templates are not part of the save;
    /// the caller supplies the cache to resume with.
    pub fn from_json(json: &str, templates: TemplateCache) -> Result<Self, serde_json::Error> {
        let mut state: SimState = serde_json::from_str(json)?;
        state.templates = templates;
        Ok(state)
    }
}

fn describe(found: &MaterialMap) -> String {
    if found.is_empty() {
        return "Nothing needed was found.".to_owned();
    }
    let parts: Vec<String> = found
        .iter()
        .map(|(item, count)| format!("{count} x {}", item.path()))
        .collect();
    format!("Gathered {}.", parts.join(", "))
}
