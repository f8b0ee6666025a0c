/*
[INPUT]:  Operator bin selections and the task's bin slots
[OUTPUT]: Applied or rejected correction outcomes with reason codes
[POS]:    Correction layer - operator interrupt state machine
[UPDATE]: When selection flow or the correction guards change
*/

use std::fmt;

use crate::bins::BinSet;
use crate::item::{BinId, Item, ItemStatus};
use crate::metrics::TaskMetrics;

/// Correction interrupt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionPhase {
    /// No selection made.
    Idle,
    /// Exactly one of {error bin, corrected bin} chosen.
    AwaitingSecondSelection,
    /// Both chosen, correction in flight.
    Correcting,
    /// Last correction applied.
    Resolved,
}

impl Default for CorrectionPhase {
    fn default() -> Self {
        CorrectionPhase::Idle
    }
}

/// Reason a correction request was rejected. All rejections are recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionRejection {
    /// Error bin and corrected bin are the same.
    NoErrorPresent,
    /// The error bin holds no item.
    EmptyBin,
    /// The selected item was superseded before the correction applied.
    StaleTarget,
}

impl fmt::Display for CorrectionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionRejection::NoErrorPresent => write!(f, "no error present in this bin"),
            CorrectionRejection::EmptyBin => write!(f, "bin holds no item to correct"),
            CorrectionRejection::StaleTarget => {
                write!(f, "item superseded by conveyor advancement")
            }
        }
    }
}

/// Result of a resolved correction attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub item_id: Option<u64>,
    pub from_bin: BinId,
    pub to_bin: BinId,
    pub accepted: bool,
    pub reason: Option<CorrectionRejection>,
    /// Prior occupant of the corrected bin, to be disposed by the caller.
    pub evicted: Option<Item>,
}

impl CorrectionOutcome {
    fn rejected(from_bin: BinId, to_bin: BinId, reason: CorrectionRejection) -> Self {
        Self {
            item_id: None,
            from_bin,
            to_bin,
            accepted: false,
            reason: Some(reason),
            evicted: None,
        }
    }
}

/// Operator correction interrupt manager.
///
/// Runs as an overlay on normal flow: a pending selection never blocks new
/// items from being classified. The manager only mutates slots it is handed
/// by the state machine; it creates no items of its own.
#[derive(Debug, Default)]
pub struct CorrectionManager {
    phase: CorrectionPhase,
    error_bin: Option<BinId>,
    corrected_bin: Option<BinId>,
    /// Occupant captured when the error bin was selected; the stale-target
    /// guard compares against it at apply time.
    expected_item: Option<u64>,
}

impl CorrectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CorrectionPhase {
        self.phase
    }

    /// Select the bin believed to hold a misrouted item.
    ///
    /// An empty slot rejects immediately; otherwise the current occupant is
    /// captured for the stale-target guard.
    pub fn select_error_bin(
        &mut self,
        bin: BinId,
        bins: &BinSet,
    ) -> Option<CorrectionRejection> {
        let Some(occupant) = bins.occupant(bin) else {
            tracing::warn!(bin, "correction rejected: {}", CorrectionRejection::EmptyBin);
            self.reset();
            return Some(CorrectionRejection::EmptyBin);
        };

        self.error_bin = Some(bin);
        self.expected_item = Some(occupant.id);
        self.advance_selection_phase();
        None
    }

    /// Select the bin the item should have been routed to.
    pub fn select_corrected_bin(&mut self, bin: BinId) {
        self.corrected_bin = Some(bin);
        self.advance_selection_phase();
    }

    /// True once both selections are present.
    pub fn ready(&self) -> bool {
        self.phase == CorrectionPhase::Correcting
    }

    /// Attempt the correction against the current slot state.
    ///
    /// Rejections reset the manager to `Idle` and are reported, never fatal.
    pub fn apply(
        &mut self,
        bins: &mut BinSet,
        metrics: &mut TaskMetrics,
        now_tick: u64,
    ) -> CorrectionOutcome {
        let (Some(from_bin), Some(to_bin)) = (self.error_bin, self.corrected_bin) else {
            // Callers gate on ready(); treat a premature apply as stale.
            self.reset();
            return CorrectionOutcome::rejected(0, 0, CorrectionRejection::StaleTarget);
        };

        if from_bin == to_bin {
            tracing::warn!(
                bin = from_bin,
                "correction rejected: {}",
                CorrectionRejection::NoErrorPresent
            );
            self.reset();
            return CorrectionOutcome::rejected(from_bin, to_bin, CorrectionRejection::NoErrorPresent);
        }

        let occupant_id = bins.occupant(from_bin).map(|item| item.id);
        let Some(occupant_id) = occupant_id else {
            tracing::warn!(
                bin = from_bin,
                "correction rejected: {}",
                CorrectionRejection::EmptyBin
            );
            self.reset();
            return CorrectionOutcome::rejected(from_bin, to_bin, CorrectionRejection::EmptyBin);
        };

        if self.expected_item != Some(occupant_id) {
            tracing::warn!(
                bin = from_bin,
                expected = ?self.expected_item,
                found = occupant_id,
                "correction rejected: {}",
                CorrectionRejection::StaleTarget
            );
            self.reset();
            return CorrectionOutcome::rejected(from_bin, to_bin, CorrectionRejection::StaleTarget);
        }

        // Guards passed: move the item and revise its routing.
        let Some(mut item) = bins.take(from_bin) else {
            self.reset();
            return CorrectionOutcome::rejected(from_bin, to_bin, CorrectionRejection::EmptyBin);
        };
        item.assigned_class = Some(to_bin);
        item.status = ItemStatus::Resolved;
        let item_id = item.id;
        let evicted = bins.place(to_bin, item, now_tick);

        metrics.record_correction();

        self.reset();
        self.phase = CorrectionPhase::Resolved;

        CorrectionOutcome {
            item_id: Some(item_id),
            from_bin,
            to_bin,
            accepted: true,
            reason: None,
            evicted,
        }
    }

    fn advance_selection_phase(&mut self) {
        self.phase = match (self.error_bin, self.corrected_bin) {
            (Some(_), Some(_)) => CorrectionPhase::Correcting,
            (None, None) => CorrectionPhase::Idle,
            _ => CorrectionPhase::AwaitingSecondSelection,
        };
    }

    fn reset(&mut self) {
        self.error_bin = None;
        self.corrected_bin = None;
        self.expected_item = None;
        self.phase = CorrectionPhase::Idle;
    }
}
