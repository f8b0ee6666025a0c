/*
[INPUT]:  Spawn requests from the task state machine
[OUTPUT]: Item records flowing through conveyor, bins, and corrections
[POS]:    Data layer - item identity, payload, and lifecycle status
[UPDATE]: When item payloads or lifecycle states change
*/

/// Destination bin index within a task's bin set.
pub type BinId = usize;

/// Colour payload for the sorting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Green,
    Blue,
}

impl Colour {
    pub fn from_bin(bin: BinId) -> Option<Self> {
        match bin {
            0 => Some(Colour::Red),
            1 => Some(Colour::Green),
            2 => Some(Colour::Blue),
            _ => None,
        }
    }

    pub fn bin(self) -> BinId {
        match self {
            Colour::Red => 0,
            Colour::Green => 1,
            Colour::Blue => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Colour::Red => "red",
            Colour::Green => "green",
            Colour::Blue => "blue",
        }
    }
}

/// Task-specific item payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute {
    /// Sorting: the box colour.
    Colour(Colour),
    /// Packaging: items packed into the box.
    ItemCount(u32),
    /// Inspection: measured size in centimetres.
    SizeCm(f64),
}

/// Lifecycle status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Spawned, waiting on the conveyor.
    Queued,
    /// Moving towards the decision point.
    InTransit,
    /// Routed into a holding slot, still correctable.
    PendingCorrection,
    /// Routing revised by an operator correction.
    Resolved,
    /// Removed from the line.
    Disposed,
}

/// One unit flowing through a task run.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: u64,
    pub attribute: Attribute,
    pub true_class: Option<BinId>,
    pub assigned_class: Option<BinId>,
    pub status: ItemStatus,
    /// Conveyor coordinate; 0 at spawn, classification at the midpoint.
    pub position: f64,
}

impl Item {
    pub fn new(id: u64, attribute: Attribute) -> Self {
        Self {
            id,
            attribute,
            true_class: None,
            assigned_class: None,
            status: ItemStatus::Queued,
            position: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_bin_mapping_round_trips() {
        for colour in [Colour::Red, Colour::Green, Colour::Blue] {
            assert_eq!(Colour::from_bin(colour.bin()), Some(colour));
        }
        assert_eq!(Colour::from_bin(3), None);
    }

    #[test]
    fn new_item_starts_queued_at_origin() {
        let item = Item::new(7, Attribute::ItemCount(5));
        assert_eq!(item.status, ItemStatus::Queued);
        assert_eq!(item.position, 0.0);
        assert!(item.true_class.is_none());
        assert!(item.assigned_class.is_none());
    }
}
