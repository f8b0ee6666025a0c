/*
[INPUT]:  Spawned items and per-tick advance distances from the state machine
[OUTPUT]: Strictly FIFO in-flight queue with transport positions
[POS]:    Transport layer - owned, encapsulated item queue
[UPDATE]: When transport geometry or queue semantics change
*/

use std::collections::VecDeque;

use crate::item::{Item, ItemStatus};

/// Abstract conveyor length in transport units.
pub const CONVEYOR_LENGTH: f64 = 1000.0;

/// The decision point; the head is classified once it reaches this.
pub const MIDPOINT: f64 = CONVEYOR_LENGTH / 2.0;

/// FIFO queue of items in transit towards the decision point.
///
/// Owned exclusively by one `TaskSim`; nothing outside this module mutates
/// positions or ordering.
#[derive(Debug, Default)]
pub struct Conveyor {
    items: VecDeque<Item>,
}

impl Conveyor {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enqueue a freshly spawned item at the conveyor origin.
    pub fn push(&mut self, item: Item) {
        self.items.push_back(item);
    }

    /// Advance every queued item by `step` units and mark it in transit.
    pub fn advance(&mut self, step: f64) {
        for item in self.items.iter_mut() {
            item.position += step;
            item.status = ItemStatus::InTransit;
        }
    }

    /// True when the head item has reached the decision point.
    pub fn head_at_midpoint(&self) -> bool {
        self.items
            .front()
            .is_some_and(|item| item.position >= MIDPOINT)
    }

    /// Remove and return the head item.
    pub fn pop_head(&mut self) -> Option<Item> {
        self.items.pop_front()
    }

    /// Remove every queued item, e.g. on stop.
    pub fn drain(&mut self) -> Vec<Item> {
        self.items.drain(..).collect()
    }
}
