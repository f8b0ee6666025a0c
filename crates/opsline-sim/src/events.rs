/*
[INPUT]:  State machine transitions within one task tick
[OUTPUT]: Events crossing the component boundary to presentation and metrics
[POS]:    Event layer - the only data leaving the simulation core
[UPDATE]: When adding event kinds or payload fields
*/

use crate::correction::CorrectionRejection;

/// All events a task can emit during a tick or command application.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A new item entered the conveyor.
    Spawned { item_id: u64 },

    /// An item was routed at the decision point.
    Classified {
        item_id: u64,
        true_class: &'static str,
        assigned_class: &'static str,
        error_occurred: bool,
        destination_bin: &'static str,
    },

    /// An operator correction resolved, accepted or rejected.
    ///
    /// `to_bin` is absent when the request was rejected before the second
    /// selection arrived.
    Correction {
        item_id: Option<u64>,
        from_bin: &'static str,
        to_bin: Option<&'static str>,
        accepted: bool,
        reason: Option<CorrectionRejection>,
    },

    /// An item left the line (eviction, grace expiry, or stop).
    Disposed { item_id: u64, bin: &'static str },

    /// A distraction pulse fired; pure presentation trigger, no state impact.
    Distraction { light: bool, sound: bool },
}
