// Settlements: the aggregate that owns buildings and the material bank.
//
// A `Settlement` is the single point of mutation for its buildings and its
// bank, and the single place that tracks whether it needs persisting. Every
// mutating method marks it dirty; the host drains dirty settlements through
// `SimState::take_dirty_settlements` and writes them out.
//
// ## Persistence
//
// Settlements serialize through `SettlementRecord`, a camelCase compound
// record matching what the host world stores:
//
//   { "id": "...", "anchorPosition": <packed i64>, "radius": 48,
//     "name": "Oakvale", "materials": { "minecraft:stone": 12 },
//     "buildings": [ { "id": "...", "position": <packed i64>,
//                      "structureRef": "hamlet:small_hut", "rotation": 90,
//                      "status": "IN_PROGRESS", "progress": 0.4,
//                      "requiredMaterials": {}, "providedMaterials": {},
//                      "placeholderPositions": [{"x":0,"y":64,"z":0}],
//                      "previewPositions": [] } ] }
//
// Missing fields default: status RESERVED, rotation 0, material maps empty.
// Air entries in material maps are dropped on read. Each building record is
// decoded on its own; an unreadable one is logged and skipped, so one bad
// record never takes the rest of the settlement with it.
//
// See also: `building.rs` for `Building`, `ledger.rs` for the bank,
// `sim.rs` for the operations that drive these methods.

use crate::building::{Building, BuildingStatus};
use crate::ledger::{MaterialBank, MaterialLedger, MaterialMap};
use crate::rotation::Rotation;
use crate::scheduler::BuildingLookup;
use crate::template::BuildingCategory;
use crate::types::{BlockId, BuildingId, SettlementId, VoxelCoord};
use crate::validation::Bounds;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "SettlementRecord", into = "SettlementRecord")]
pub struct Settlement {
    pub id: SettlementId,
    pub name: String,
    pub anchor: VoxelCoord,
    radius: i32,
    buildings: BTreeMap<BuildingId, Building>,
    bank: MaterialBank,
    dirty: bool,
}

impl Settlement {
    /// `radius` is clamped to at least 1.
    pub fn new(id: SettlementId, name: impl Into<String>, anchor: VoxelCoord, radius: i32) -> Self {
        Self {
            id,
            name: name.into(),
            anchor,
            radius: radius.max(1),
            buildings: BTreeMap::new(),
            bank: MaterialBank::new(),
            dirty: true,
        }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            center: self.anchor,
            radius: self.radius,
        }
    }

    pub fn contains(&self, pos: VoxelCoord) -> bool {
        self.bounds().contains(pos)
    }

    // -- buildings ------------------------------------------------------------

    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    /// Mutable access. Marks the settlement dirty.
    pub fn building_mut(&mut self, id: BuildingId) -> Option<&mut Building> {
        let b = self.buildings.get_mut(&id)?;
        self.dirty = true;
        Some(b)
    }

    /// Mutable access to a building together with the bank.
    pub fn building_and_bank_mut(&mut self, id: BuildingId) -> Option<(&mut Building, &mut MaterialBank)> {
        let b = self.buildings.get_mut(&id)?;
        self.dirty = true;
        Some((b, &mut self.bank))
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    /// Buildings the worker system may assign work to.
    pub fn completed_buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings
            .values()
            .filter(|b| b.status() == BuildingStatus::Completed)
    }

    pub fn insert_building(&mut self, building: Building) {
        self.dirty = true;
        self.buildings.insert(building.id, building);
    }

    pub fn remove_building(&mut self, id: BuildingId) -> Option<Building> {
        let removed = self.buildings.remove(&id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    // -- bank -----------------------------------------------------------------

    pub fn bank(&self) -> &MaterialBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut MaterialBank {
        self.dirty = true;
        &mut self.bank
    }

    /// Deposit goods into the bank, then earmark them for RESERVED
    /// buildings that still need them, in building-id order.
    pub fn deposit(&mut self, item: &BlockId, count: u32) {
        if count == 0 || item.is_air() {
            return;
        }
        self.dirty = true;
        self.bank.add(item, count);
        for building in self.buildings.values_mut() {
            if building.status() != BuildingStatus::Reserved {
                continue;
            }
            let want = building.ledger.outstanding_of(item);
            if want == 0 {
                continue;
            }
            let got = self.bank.remove(item, want);
            building.ledger.provide(item, got);
            if self.bank.count(item) == 0 {
                break;
            }
        }
    }

    // -- dirty tracking -------------------------------------------------------

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning its previous value.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // -- persistence ----------------------------------------------------------

    pub fn to_record(&self) -> SettlementRecord {
        SettlementRecord::from(self.clone())
    }
}

impl BuildingLookup for BTreeMap<SettlementId, Settlement> {
    fn building_mut(&mut self, settlement: SettlementId, building: BuildingId) -> Option<&mut Building> {
        self.get_mut(&settlement)?.building_mut(building)
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub id: SettlementId,
    pub anchor_position: i64,
    pub radius: i32,
    #[serde(default)]
    pub name: String,
    /// Kept undecoded so each building can fail on its own.
    #[serde(default)]
    pub buildings: Vec<serde_json::Value>,
    #[serde(default)]
    pub materials: MaterialMap,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingRecord {
    pub id: BuildingId,
    pub position: i64,
    pub structure_ref: String,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub required_materials: MaterialMap,
    #[serde(default)]
    pub provided_materials: MaterialMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub consumed_materials: MaterialMap,
    #[serde(default)]
    pub placeholder_positions: Vec<VoxelCoord>,
    #[serde(default)]
    pub preview_positions: Vec<VoxelCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<BuildingCategory>,
}

impl BuildingRecord {
    fn from_building(b: &Building) -> Self {
        Self {
            id: b.id,
            position: b.position.pack(),
            structure_ref: b.structure_ref.clone(),
            rotation: b.rotation.degrees(),
            status: Some(b.status().as_str().to_owned()),
            progress: b.progress(),
            required_materials: b.ledger.required().clone(),
            provided_materials: b.ledger.provided().clone(),
            consumed_materials: b.ledger.consumed().clone(),
            placeholder_positions: b.placeholder_positions.to_vec(),
            preview_positions: b.preview_positions.clone(),
            category: Some(b.category),
        }
    }

    fn into_building(self, settlement_id: SettlementId) -> Result<Building, String> {
        let status = match self.status.as_deref() {
            None => BuildingStatus::Reserved,
            Some(name) => {
                BuildingStatus::parse(name).ok_or_else(|| format!("unknown status '{name}'"))?
            }
        };
        let category = self
            .category
            .unwrap_or_else(|| BuildingCategory::infer_from_id(&self.structure_ref));
        let ledger = MaterialLedger::from_parts(
            self.required_materials,
            self.provided_materials,
            self.consumed_materials,
        );
        let mut building = Building::restore(
            self.id,
            settlement_id,
            self.structure_ref,
            VoxelCoord::unpack(self.position),
            Rotation::from_degrees(self.rotation),
            status,
            self.progress,
            category,
            ledger,
        );
        building.placeholder_positions = SmallVec::from_vec(self.placeholder_positions);
        building.preview_positions = self.preview_positions;
        Ok(building)
    }
}

impl From<Settlement> for SettlementRecord {
    fn from(s: Settlement) -> Self {
        let buildings = s
            .buildings
            .values()
            .filter_map(|b| serde_json::to_value(BuildingRecord::from_building(b)).ok())
            .collect();
        Self {
            id: s.id,
            anchor_position: s.anchor.pack(),
            radius: s.radius,
            name: s.name,
            buildings,
            materials: s.bank.snapshot(),
        }
    }
}

impl From<SettlementRecord> for Settlement {
    fn from(record: SettlementRecord) -> Self {
        let mut settlement = Settlement::new(
            record.id,
            record.name,
            VoxelCoord::unpack(record.anchor_position),
            record.radius,
        );
        settlement.bank = MaterialBank::from_map(record.materials);

        for (index, value) in record.buildings.into_iter().enumerate() {
            let decoded = serde_json::from_value::<BuildingRecord>(value)
                .map_err(|e| e.to_string())
                .and_then(|r| r.into_building(record.id));
            match decoded {
                Ok(building) if building.status() == BuildingStatus::Cancelled => {
                    tracing::warn!(settlement = %record.id, building = %building.id, "dropping cancelled building record");
                }
                Ok(building) => {
                    settlement.buildings.insert(building.id, building);
                }
                Err(error) => {
                    tracing::warn!(settlement = %record.id, index, %error, "skipping unreadable building record");
                }
            }
        }
        settlement.dirty = false;
        settlement
    }
}
