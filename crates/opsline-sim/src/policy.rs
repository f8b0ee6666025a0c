/*
[INPUT]:  Task configuration (colour count, package capacity, size band)
[OUTPUT]: Spawned attributes and ground-truth classifications per task kind
[POS]:    Policy layer - the per-task half of the generic state machine
[UPDATE]: When task domains or bin layouts change
*/

use rand::Rng;
use std::cmp::Ordering;

use crate::item::{Attribute, BinId, Colour};

/// Packaging bin layout: a box is short one item, exact, or one over.
pub const BIN_UNDER: BinId = 0;
pub const BIN_EXACT: BinId = 1;
pub const BIN_OVER: BinId = 2;

/// Inspection bin layout.
pub const BIN_ACCEPT: BinId = 0;
pub const BIN_REJECT: BinId = 1;

/// Spawned inspection sizes extend this far past the accepted band on each
/// side, so defective items genuinely occur.
const INSPECTION_SPAWN_MARGIN_CM: f64 = 2.0;

/// The three operator task variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Sorting,
    Packaging,
    Inspection,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Sorting => "sorting",
            TaskKind::Packaging => "packaging",
            TaskKind::Inspection => "inspection",
        }
    }
}

/// Pure attribute -> classification rules for one task variant.
///
/// The generic `TaskSim` owns the lifecycle; the policy only decides what an
/// item looks like and which bin is correct for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskPolicy {
    Sorting { num_colours: u8 },
    Packaging { capacity: u32 },
    Inspection { accept_min_cm: f64, accept_max_cm: f64 },
}

impl TaskPolicy {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPolicy::Sorting { .. } => TaskKind::Sorting,
            TaskPolicy::Packaging { .. } => TaskKind::Packaging,
            TaskPolicy::Inspection { .. } => TaskKind::Inspection,
        }
    }

    /// Number of destination bins for this task.
    pub fn bin_count(&self) -> usize {
        match self {
            TaskPolicy::Sorting { num_colours } => *num_colours as usize,
            TaskPolicy::Packaging { .. } => 3,
            TaskPolicy::Inspection { .. } => 2,
        }
    }

    /// Draw the payload for a freshly spawned item.
    pub fn spawn_attribute<R: Rng>(&self, rng: &mut R) -> Attribute {
        match self {
            TaskPolicy::Sorting { num_colours } => {
                let bin = rng.gen_range(0..*num_colours as usize);
                // Bin indices below num_colours always name a colour.
                Attribute::Colour(Colour::from_bin(bin).unwrap_or(Colour::Red))
            }
            TaskPolicy::Packaging { capacity } => Attribute::ItemCount(*capacity),
            TaskPolicy::Inspection {
                accept_min_cm,
                accept_max_cm,
            } => {
                let lo = accept_min_cm - INSPECTION_SPAWN_MARGIN_CM;
                let hi = accept_max_cm + INSPECTION_SPAWN_MARGIN_CM;
                Attribute::SizeCm(rng.gen_range(lo..=hi))
            }
        }
    }

    /// Ground-truth bin for an attribute, deterministic.
    pub fn true_class(&self, attribute: &Attribute) -> BinId {
        match (self, attribute) {
            (TaskPolicy::Sorting { .. }, Attribute::Colour(colour)) => colour.bin(),
            (TaskPolicy::Packaging { capacity }, Attribute::ItemCount(count)) => {
                match count.cmp(capacity) {
                    Ordering::Less => BIN_UNDER,
                    Ordering::Equal => BIN_EXACT,
                    Ordering::Greater => BIN_OVER,
                }
            }
            (
                TaskPolicy::Inspection {
                    accept_min_cm,
                    accept_max_cm,
                },
                Attribute::SizeCm(size),
            ) => {
                if (*accept_min_cm..=*accept_max_cm).contains(size) {
                    BIN_ACCEPT
                } else {
                    BIN_REJECT
                }
            }
            // Attributes are only ever produced by this policy's own spawner,
            // so kinds cannot mismatch.
            _ => 0,
        }
    }

    /// Human-readable bin label, used in events and logs.
    pub fn bin_label(&self, bin: BinId) -> &'static str {
        match self {
            TaskPolicy::Sorting { .. } => match Colour::from_bin(bin) {
                Some(colour) => colour.as_str(),
                None => "unknown",
            },
            TaskPolicy::Packaging { .. } => match bin {
                BIN_UNDER => "under",
                BIN_EXACT => "exact",
                BIN_OVER => "over",
                _ => "unknown",
            },
            TaskPolicy::Inspection { .. } => match bin {
                BIN_ACCEPT => "accept",
                BIN_REJECT => "reject",
                _ => "unknown",
            },
        }
    }
}
