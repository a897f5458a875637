// Material bookkeeping: the per-building ledger and the settlement bank.
//
// ## MaterialLedger
//
// Owned by a `Building`. Tracks three maps keyed by item type:
// - `required`: computed once from the template at reservation (air never
//   appears; see `calculate_materials`).
// - `provided`: materials earmarked for this building out of the settlement
//   bank but not yet used. Capped per item at what is still outstanding.
// - `consumed`: what was spent when construction started.
//
// The maps are private; callers read snapshots and mutate through methods
// that keep these invariants:
// - no air keys and no zero counts in any map;
// - `provided[k] <= required[k]` for materials accepted through `provide`;
// - `has_all_materials() <=> provided covers required`.
//
// Conservation: for a building that never bypasses the ledger,
// `consumed + provided + refunded == required at creation`. Consumption
// moves `required` into `consumed`; refunds drain `provided`.
//
// ## MaterialBank
//
// The settlement-level stockpile. Deposits from the worker system and from
// container scans land here; buildings draw their earmarks from it.
//
// ## Atomic consumption
//
// `MaterialLedger::consume` either spends every required item (from
// `provided` first, then the bank) or changes nothing. The returned
// `ConsumptionReceipt` records exactly what moved, so `restore` can undo a
// start that failed after consumption (the compensating path in `sim.rs`).
//
// See also: `scanner.rs` (filling `provided`), `building.rs` (ownership),
// `settlement.rs` (persistence of both maps).

use crate::template::StructureTemplate;
use crate::types::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item type -> count.
pub type MaterialMap = BTreeMap<BlockId, u32>;

/// Tally the non-air blocks of a template into required counts.
pub fn calculate_materials(template: &StructureTemplate) -> MaterialMap {
    let mut out = MaterialMap::new();
    for block in template.non_air_blocks() {
        *out.entry(block.block.clone()).or_insert(0) += 1;
    }
    out
}

/// Drop air keys and zero counts.
pub fn sanitized(map: MaterialMap) -> MaterialMap {
    map.into_iter()
        .filter(|(item, count)| !item.is_air() && *count > 0)
        .collect()
}

fn add_to(map: &mut MaterialMap, item: &BlockId, count: u32) {
    if count == 0 || item.is_air() {
        return;
    }
    *map.entry(item.clone()).or_insert(0) += count;
}

/// Subtract, clamped at zero. Returns the amount actually removed.
fn remove_from(map: &mut MaterialMap, item: &BlockId, count: u32) -> u32 {
    let Some(have) = map.get_mut(item) else {
        return 0;
    };
    let removed = (*have).min(count);
    *have -= removed;
    if *have == 0 {
        map.remove(item);
    }
    removed
}

// ---------------------------------------------------------------------------
// Settlement bank
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialBank {
    items: MaterialMap,
}

impl MaterialBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(items: MaterialMap) -> Self {
        Self {
            items: sanitized(items),
        }
    }

    pub fn count(&self, item: &BlockId) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    pub fn add(&mut self, item: &BlockId, count: u32) {
        add_to(&mut self.items, item, count);
    }

    pub fn merge(&mut self, materials: &MaterialMap) {
        for (item, count) in materials {
            self.add(item, *count);
        }
    }

    /// Remove up to `count`. Returns the amount removed.
    pub fn remove(&mut self, item: &BlockId, count: u32) -> u32 {
        remove_from(&mut self.items, item, count)
    }

    pub fn snapshot(&self) -> MaterialMap {
        self.items.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Building ledger
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLedger {
    required: MaterialMap,
    provided: MaterialMap,
    #[serde(default)]
    consumed: MaterialMap,
}

/// Exactly what one `consume` (or `waive`) moved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsumptionReceipt {
    pub from_provided: MaterialMap,
    pub from_bank: MaterialMap,
    /// Provided materials beyond what was required, handed back to the bank.
    pub excess_to_bank: MaterialMap,
    /// The requirement that was cleared.
    pub required: MaterialMap,
    /// True when requirements were waived instead of paid.
    pub waived: bool,
}

impl MaterialLedger {
    pub fn new(required: MaterialMap) -> Self {
        Self {
            required: sanitized(required),
            ..Self::default()
        }
    }

    pub fn from_template(template: &StructureTemplate) -> Self {
        Self::new(calculate_materials(template))
    }

    /// Rebuild from persisted maps, filtering air and zero counts.
    pub fn from_parts(required: MaterialMap, provided: MaterialMap, consumed: MaterialMap) -> Self {
        Self {
            required: sanitized(required),
            provided: sanitized(provided),
            consumed: sanitized(consumed),
        }
    }

    pub fn required(&self) -> &MaterialMap {
        &self.required
    }

    pub fn provided(&self) -> &MaterialMap {
        &self.provided
    }

    pub fn consumed(&self) -> &MaterialMap {
        &self.consumed
    }

    pub fn required_of(&self, item: &BlockId) -> u32 {
        self.required.get(item).copied().unwrap_or(0)
    }

    pub fn provided_of(&self, item: &BlockId) -> u32 {
        self.provided.get(item).copied().unwrap_or(0)
    }

    /// Still needed for `item` after what has been provided.
    pub fn outstanding_of(&self, item: &BlockId) -> u32 {
        self.required_of(item).saturating_sub(self.provided_of(item))
    }

    pub fn outstanding(&self) -> MaterialMap {
        self.required
            .keys()
            .map(|k| (k.clone(), self.outstanding_of(k)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    pub fn has_all_materials(&self) -> bool {
        self.required
            .iter()
            .all(|(item, need)| self.provided_of(item) >= *need)
    }

    /// True if `bank` plus what is already provided covers every requirement.
    pub fn can_afford(&self, bank: &MaterialBank) -> bool {
        self.shortfall(bank).is_empty()
    }

    /// Per item, how much neither `provided` nor `bank` can cover.
    pub fn shortfall(&self, bank: &MaterialBank) -> MaterialMap {
        self.required
            .iter()
            .filter_map(|(item, need)| {
                let have = self.provided_of(item).saturating_add(bank.count(item));
                (have < *need).then(|| (item.clone(), need - have))
            })
            .collect()
    }

    /// Earmark up to `count` of `item`, capped at what is still
    /// outstanding. Returns the number accepted.
    pub fn provide(&mut self, item: &BlockId, count: u32) -> u32 {
        let accepted = self.outstanding_of(item).min(count);
        add_to(&mut self.provided, item, accepted);
        accepted
    }

    /// Move outstanding requirements from `bank` into `provided`. Returns
    /// what moved.
    pub fn draw_from_bank(&mut self, bank: &mut MaterialBank) -> MaterialMap {
        let mut moved = MaterialMap::new();
        for item in self.required.keys().cloned().collect::<Vec<_>>() {
            let want = self.outstanding_of(&item);
            let got = bank.remove(&item, want);
            add_to(&mut self.provided, &item, got);
            add_to(&mut moved, &item, got);
        }
        moved
    }

    /// Clear `provided`, returning what it held. The refund path is the only
    /// caller besides consumption.
    pub fn take_provided(&mut self) -> MaterialMap {
        std::mem::take(&mut self.provided)
    }

    /// Spend every requirement, from `provided` first and `bank` for the
    /// rest. On shortfall nothing changes and the missing amounts are
    /// returned.
    pub fn consume(&mut self, bank: &mut MaterialBank) -> Result<ConsumptionReceipt, MaterialMap> {
        let missing = self.shortfall(bank);
        if !missing.is_empty() {
            return Err(missing);
        }
        let mut receipt = ConsumptionReceipt {
            required: self.required.clone(),
            ..ConsumptionReceipt::default()
        };
        for (item, need) in &self.required {
            let from_provided = remove_from(&mut self.provided, item, *need);
            let from_bank = bank.remove(item, need - from_provided);
            debug_assert_eq!(from_provided + from_bank, *need);
            add_to(&mut receipt.from_provided, item, from_provided);
            add_to(&mut receipt.from_bank, item, from_bank);
            add_to(&mut self.consumed, item, *need);
        }
        self.required.clear();
        receipt.excess_to_bank = self.take_provided();
        bank.merge(&receipt.excess_to_bank);
        Ok(receipt)
    }

    /// Clear requirements without paying for them (unlimited-materials
    /// mode). Anything provided goes back to the bank.
    pub fn waive(&mut self, bank: &mut MaterialBank) -> ConsumptionReceipt {
        let receipt = ConsumptionReceipt {
            excess_to_bank: self.take_provided(),
            required: std::mem::take(&mut self.required),
            waived: true,
            ..ConsumptionReceipt::default()
        };
        bank.merge(&receipt.excess_to_bank);
        receipt
    }

    /// Undo a `consume` or `waive`, restoring ledger and bank exactly.
    pub fn restore(&mut self, receipt: ConsumptionReceipt, bank: &mut MaterialBank) {
        for (item, count) in &receipt.excess_to_bank {
            bank.remove(item, *count);
            add_to(&mut self.provided, item, *count);
        }
        for (item, count) in &receipt.from_provided {
            add_to(&mut self.provided, item, *count);
        }
        bank.merge(&receipt.from_bank);
        if !receipt.waived {
            for (item, count) in &receipt.required {
                remove_from(&mut self.consumed, item, *count);
            }
        }
        self.required = receipt.required;
    }
}
