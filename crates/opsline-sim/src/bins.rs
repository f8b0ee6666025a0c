/*
[INPUT]:  Classified items routed by the state machine or moved by corrections
[OUTPUT]: Single-occupancy holding slots with eviction and grace-period expiry
[POS]:    Destination layer - owned, encapsulated bin slots
[UPDATE]: When slot capacity or disposal rules change
*/

use crate::item::{BinId, Item};

#[derive(Debug, Default)]
struct HoldingSlot {
    occupant: Option<(Item, u64)>,
}

/// One single-occupancy holding slot per destination bin.
///
/// A new arrival evicts the prior occupant; occupants older than the grace
/// period are expired each tick. Owned exclusively by one `TaskSim`.
#[derive(Debug)]
pub struct BinSet {
    slots: Vec<HoldingSlot>,
}

impl BinSet {
    pub fn new(bin_count: usize) -> Self {
        let mut slots = Vec::with_capacity(bin_count);
        slots.resize_with(bin_count, HoldingSlot::default);
        Self { slots }
    }

    pub fn bin_count(&self) -> usize {
        self.slots.len()
    }

    /// Place an item into a bin's slot, returning the evicted prior occupant.
    pub fn place(&mut self, bin: BinId, item: Item, now_tick: u64) -> Option<Item> {
        let slot = self.slots.get_mut(bin)?;
        slot.occupant
            .replace((item, now_tick))
            .map(|(evicted, _)| evicted)
    }

    /// The item currently occupying a bin's slot.
    pub fn occupant(&self, bin: BinId) -> Option<&Item> {
        self.slots
            .get(bin)
            .and_then(|slot| slot.occupant.as_ref())
            .map(|(item, _)| item)
    }

    /// Remove and return a bin's occupant.
    pub fn take(&mut self, bin: BinId) -> Option<Item> {
        self.slots
            .get_mut(bin)
            .and_then(|slot| slot.occupant.take())
            .map(|(item, _)| item)
    }

    /// Expire occupants placed more than `grace_ticks` ago.
    pub fn expire(&mut self, now_tick: u64, grace_ticks: u64) -> Vec<Item> {
        let mut expired = Vec::new();
        for slot in self.slots.iter_mut() {
            let past_grace = slot
                .occupant
                .as_ref()
                .is_some_and(|(_, placed_at)| now_tick.saturating_sub(*placed_at) >= grace_ticks);
            if past_grace && let Some((item, _)) = slot.occupant.take() {
                expired.push(item);
            }
        }
        expired
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.occupant.is_some())
            .count()
    }

    /// Empty every slot, e.g. on stop.
    pub fn drain(&mut self) -> Vec<Item> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.occupant.take())
            .map(|(item, _)| item)
            .collect()
    }

    /// Resize for a reconfigured bin count, disposing occupants of removed
    /// bins. Surviving occupants stay in place.
    pub fn resize(&mut self, bin_count: usize) -> Vec<Item> {
        let mut removed = Vec::new();
        while self.slots.len() > bin_count {
            if let Some(mut slot) = self.slots.pop()
                && let Some((item, _)) = slot.occupant.take()
            {
                removed.push(item);
            }
        }
        while self.slots.len() < bin_count {
            self.slots.push(HoldingSlot::default());
        }
        removed
    }
}
