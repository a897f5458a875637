// Storage container inventories.
//
// A `Container` is a fixed number of item slots, each holding at most one
// `ItemStack` of a single item type up to a maximum stack size. Containers
// live in the world (see `world.rs`) keyed by block position; the scanner
// extracts from them and the refund path deposits back into them.
//
// All operations are quantity-exact: `take` returns exactly what it removed
// and `insert` returns exactly what did not fit, so the material ledger can
// account for every item.
//
// See also: `scanner.rs` for the gather/refund logic built on these.

use crate::types::BlockId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: BlockId,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: impl Into<BlockId>, count: u32) -> Self {
        Self {
            item: item.into(),
            count,
        }
    }
}

/// A slotted inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    slots: Vec<Option<ItemStack>>,
    max_stack_size: u32,
}

impl Container {
    pub fn new(slot_count: usize, max_stack_size: u32) -> Self {
        Self {
            slots: vec![None; slot_count],
            max_stack_size: max_stack_size.max(1),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Remove up to `count` items from one slot. Returns the number taken.
    pub fn take_from_slot(&mut self, index: usize, count: u32) -> u32 {
        let Some(slot) = self.slots.get_mut(index) else {
            return 0;
        };
        let Some(stack) = slot.as_mut() else {
            return 0;
        };
        let taken = stack.count.min(count);
        stack.count -= taken;
        if stack.count == 0 {
            *slot = None;
        }
        taken
    }

    /// Insert up to `count` of `item`, topping up existing stacks before
    /// opening empty slots. Returns the number that did not fit.
    pub fn insert(&mut self, item: &BlockId, count: u32) -> u32 {
        if item.is_air() {
            return count;
        }
        let mut remaining = count;
        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if &stack.item == item && stack.count < self.max_stack_size {
                let moved = (self.max_stack_size - stack.count).min(remaining);
                stack.count += moved;
                remaining -= moved;
            }
        }
        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let moved = self.max_stack_size.min(remaining);
                *slot = Some(ItemStack::new(item.clone(), moved));
                remaining -= moved;
            }
        }
        remaining
    }

    /// How many of `item` could still be inserted.
    pub fn free_capacity_for(&self, item: &BlockId) -> u32 {
        self.slots
            .iter()
            .map(|slot| match slot {
                None => self.max_stack_size,
                Some(stack) if &stack.item == item => self.max_stack_size - stack.count,
                Some(_) => 0,
            })
            .sum()
    }

    pub fn count_of(&self, item: &BlockId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| &s.item == item)
            .map(|s| s.count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone() -> BlockId {
        BlockId::new("minecraft:stone")
    }

    #[test]
    fn insert_fills_existing_stacks_first() {
        let mut c = Container::new(3, 64);
        assert_eq!(c.insert(&stone(), 10), 0);
        assert_eq!(c.insert(&stone(), 60), 0);
        assert_eq!(c.slot(0).unwrap().count, 64);
        assert_eq!(c.slot(1).unwrap().count, 6);
        assert_eq!(c.count_of(&stone()), 70);
    }

    #[test]
    fn insert_reports_overflow() {
        let mut c = Container::new(2, 16);
        assert_eq!(c.insert(&stone(), 40), 8);
        assert_eq!(c.free_capacity_for(&stone()), 0);
        assert_eq!(c.insert(&BlockId::new("minecraft:dirt"), 1), 1);
    }

    #[test]
    fn take_clears_emptied_slot() {
        let mut c = Container::new(1, 64);
        c.insert(&stone(), 5);
        assert_eq!(c.take_from_slot(0, 3), 3);
        assert_eq!(c.take_from_slot(0, 10), 2);
        assert!(c.slot(0).is_none());
        assert!(c.is_empty());
        assert_eq!(c.take_from_slot(7, 1), 0);
    }

    #[test]
    fn air_is_never_stored() {
        let mut c = Container::new(1, 64);
        assert_eq!(c.insert(&BlockId::air(), 4), 4);
        assert!(c.is_empty());
    }
}
