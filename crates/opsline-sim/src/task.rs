/*
[INPUT]:  Ticks from the external scheduler, operator commands at tick boundaries
[OUTPUT]: Item lifecycle transitions and the events they emit
[POS]:    Orchestration layer - the generic per-task state machine
[UPDATE]: When phase transitions, spawn policy, or disposal rules change
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::bins::BinSet;
use crate::classifier;
use crate::config::{SettingsError, TaskConfig, TaskSettings};
use crate::conveyor::{Conveyor, MIDPOINT};
use crate::correction::{CorrectionManager, CorrectionPhase};
use crate::events::TaskEvent;
use crate::item::{BinId, Item, ItemStatus};
use crate::metrics::{MetricsSnapshot, TaskMetrics};
use crate::policy::TaskKind;

/// Base scheduler period in milliseconds; task speeds are multiples of this.
pub const TICK_MS: u64 = 50;

/// Holding-slot occupants are disposed after this many ticks (5 s).
const GRACE_PERIOD_TICKS: u64 = 100;

/// Spawn gate: spawn only if uniform(0,1) clears 0.4 +- 0.1 and half the task
/// period has elapsed since the last spawn. Bursty arrivals by design.
const SPAWN_GATE: f64 = 0.4;
const SPAWN_GATE_JITTER: f64 = 0.1;

/// Distraction pulse cadence (500 ms) and trigger gate.
const DISTRACTION_INTERVAL_TICKS: u64 = 10;
const DISTRACTION_GATE: f64 = 0.75;

/// State machine phase. `Correcting` is not a phase: corrections overlay
/// normal flow through the `CorrectionManager` and never block it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Waiting to create the first in-flight item.
    Spawning,
    /// Items advancing towards the decision point.
    Transporting,
    /// Head item at the decision point, routed on this tick.
    Classifying,
    /// Queue drained after classification; waiting on the spawn gate.
    Idle,
}

/// One task instance: the generic state machine, parameterized by the policy
/// in its config. Exclusively owns its conveyor, bin slots, metrics, and RNG.
#[derive(Debug)]
pub struct TaskSim {
    config: TaskConfig,
    phase: TaskPhase,
    running: bool,
    paused: bool,
    conveyor: Conveyor,
    bins: BinSet,
    correction: CorrectionManager,
    metrics: TaskMetrics,
    rng: StdRng,
    next_item_id: u64,
    elapsed_ticks: u64,
    since_spawn_ms: u64,
    total_spawned: u64,
}

impl TaskSim {
    pub fn new(config: TaskConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(config: TaskConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: TaskConfig, rng: StdRng) -> Self {
        let bin_count = config.policy.bin_count();
        Self {
            config,
            phase: TaskPhase::Spawning,
            running: false,
            paused: false,
            conveyor: Conveyor::new(),
            bins: BinSet::new(bin_count),
            correction: CorrectionManager::new(),
            metrics: TaskMetrics::new(),
            rng,
            next_item_id: 0,
            elapsed_ticks: 0,
            since_spawn_ms: 0,
            total_spawned: 0,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.config.policy.kind()
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn correction_phase(&self) -> CorrectionPhase {
        self.correction.phase()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    pub fn queue_len(&self) -> usize {
        self.conveyor.len()
    }

    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    pub fn metrics(&self) -> &TaskMetrics {
        &self.metrics
    }

    pub fn bins(&self) -> &BinSet {
        &self.bins
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.elapsed_ticks)
    }

    /// Begin a run: the first item spawns immediately.
    pub fn start(&mut self) -> Vec<TaskEvent> {
        if self.running {
            return Vec::new();
        }
        self.running = true;
        self.paused = false;

        let mut events = Vec::new();
        self.spawn_item(&mut events);
        self.phase = TaskPhase::Transporting;
        info!(task = self.kind().as_str(), "task started");
        events
    }

    /// Freeze the run; ticks delivered while paused are no-ops.
    pub fn pause(&mut self) {
        if self.running && !self.paused {
            self.paused = true;
            info!(task = self.kind().as_str(), "task paused");
        }
    }

    /// Continue from the exact pre-pause state.
    pub fn resume(&mut self) {
        if self.running && self.paused {
            self.paused = false;
            info!(task = self.kind().as_str(), "task resumed");
        }
    }

    /// Drop all items, zero the counters, return to the pre-spawning state.
    pub fn stop(&mut self) {
        let dropped = self.conveyor.drain().len() + self.bins.drain().len();
        self.metrics.reset();
        self.correction = CorrectionManager::new();
        self.phase = TaskPhase::Spawning;
        self.running = false;
        self.paused = false;
        self.elapsed_ticks = 0;
        self.since_spawn_ms = 0;
        self.total_spawned = 0;
        self.next_item_id = 0;
        info!(task = self.kind().as_str(), dropped, "task stopped and reset");
    }

    /// Advance one tick and return the events it produced.
    pub fn tick(&mut self) -> Vec<TaskEvent> {
        if !self.running || self.paused {
            return Vec::new();
        }
        self.elapsed_ticks += 1;

        let mut events = Vec::new();

        match self.phase {
            TaskPhase::Spawning | TaskPhase::Idle => {
                if self.try_spawn(&mut events) {
                    self.phase = TaskPhase::Transporting;
                }
            }
            TaskPhase::Transporting => {
                if self.conveyor.is_empty() {
                    // Defensive recovery; the queue should never drain here.
                    warn!(
                        task = self.kind().as_str(),
                        "queue unexpectedly empty in transit; panic-spawning"
                    );
                    self.spawn_item(&mut events);
                }
                self.try_spawn(&mut events);
                self.conveyor.advance(self.step_per_tick());
                if self.conveyor.head_at_midpoint() {
                    self.phase = TaskPhase::Classifying;
                }
            }
            TaskPhase::Classifying => {
                self.classify_head(&mut events);
                self.phase = if self.conveyor.is_empty() {
                    TaskPhase::Idle
                } else {
                    TaskPhase::Transporting
                };
            }
        }

        for item in self.bins.expire(self.elapsed_ticks, GRACE_PERIOD_TICKS) {
            self.dispose(item, &mut events);
        }

        if self.config.distractions.any()
            && self.elapsed_ticks % DISTRACTION_INTERVAL_TICKS == 0
            && self.rng.gen_range(0.0..1.0) > DISTRACTION_GATE
        {
            events.push(TaskEvent::Distraction {
                light: self.config.distractions.light(),
                sound: self.config.distractions.sound(),
            });
        }

        events
    }

    /// Operator selected the bin believed to hold a misrouted item.
    pub fn select_error_bin(&mut self, bin: BinId) -> Vec<TaskEvent> {
        if !self.running || self.paused {
            return Vec::new();
        }
        if let Some(reason) = self.correction.select_error_bin(bin, &self.bins) {
            return vec![TaskEvent::Correction {
                item_id: None,
                from_bin: self.bin_label(bin),
                to_bin: None,
                accepted: false,
                reason: Some(reason),
            }];
        }
        self.resolve_correction_if_ready()
    }

    /// Operator selected the bin the item should have been routed to.
    pub fn select_corrected_bin(&mut self, bin: BinId) -> Vec<TaskEvent> {
        if !self.running || self.paused {
            return Vec::new();
        }
        self.correction.select_corrected_bin(bin);
        self.resolve_correction_if_ready()
    }

    /// Apply new settings; in-flight items are untouched and invalid settings
    /// leave the previous config active.
    pub fn apply_settings(
        &mut self,
        settings: &TaskSettings,
    ) -> Result<Vec<TaskEvent>, SettingsError> {
        let config = TaskConfig::from_settings(settings)?;
        if config.policy.kind() != self.kind() {
            return Err(SettingsError::TaskKindMismatch {
                expected: self.kind().as_str(),
                got: config.policy.kind().as_str(),
            });
        }

        let mut events = Vec::new();
        let new_bin_count = config.policy.bin_count();
        if new_bin_count != self.bins.bin_count() {
            for item in self.bins.resize(new_bin_count) {
                self.dispose(item, &mut events);
            }
        }

        info!(
            task = self.kind().as_str(),
            error_rate = config.error_rate,
            speed_ms = config.speed_ms,
            "settings applied"
        );
        self.config = config;
        Ok(events)
    }

    fn resolve_correction_if_ready(&mut self) -> Vec<TaskEvent> {
        if !self.correction.ready() {
            return Vec::new();
        }

        let outcome = self
            .correction
            .apply(&mut self.bins, &mut self.metrics, self.elapsed_ticks);

        let mut events = vec![TaskEvent::Correction {
            item_id: outcome.item_id,
            from_bin: self.bin_label(outcome.from_bin),
            to_bin: Some(self.bin_label(outcome.to_bin)),
            accepted: outcome.accepted,
            reason: outcome.reason,
        }];
        if let Some(evicted) = outcome.evicted {
            self.dispose(evicted, &mut events);
        }
        events
    }

    fn try_spawn(&mut self, events: &mut Vec<TaskEvent>) -> bool {
        let gate = SPAWN_GATE + self.rng.gen_range(-SPAWN_GATE_JITTER..=SPAWN_GATE_JITTER);
        let draw: f64 = self.rng.gen_range(0.0..1.0);

        if draw > gate && self.since_spawn_ms >= self.config.speed_ms / 2 {
            self.spawn_item(events);
            true
        } else {
            self.since_spawn_ms += TICK_MS;
            false
        }
    }

    fn spawn_item(&mut self, events: &mut Vec<TaskEvent>) {
        self.since_spawn_ms = 0;
        let attribute = self.config.policy.spawn_attribute(&mut self.rng);
        let item = Item::new(self.next_item_id, attribute);
        self.next_item_id += 1;
        self.total_spawned += 1;

        debug!(
            task = self.kind().as_str(),
            item_id = item.id,
            attribute = ?item.attribute,
            "item spawned"
        );
        events.push(TaskEvent::Spawned { item_id: item.id });
        self.conveyor.push(item);
    }

    fn classify_head(&mut self, events: &mut Vec<TaskEvent>) {
        let Some(mut item) = self.conveyor.pop_head() else {
            warn!(
                task = self.kind().as_str(),
                "no item at the decision point; skipping classification"
            );
            return;
        };

        let outcome = classifier::classify(
            &mut self.rng,
            &self.config.policy,
            &item.attribute,
            self.config.error_rate,
        );
        item.true_class = Some(outcome.true_class);
        item.assigned_class = Some(outcome.assigned_class);
        item.status = ItemStatus::PendingCorrection;

        self.metrics
            .record_classified(outcome.true_class, outcome.assigned_class);
        events.push(TaskEvent::Classified {
            item_id: item.id,
            true_class: self.bin_label(outcome.true_class),
            assigned_class: self.bin_label(outcome.assigned_class),
            error_occurred: outcome.error_occurred,
            destination_bin: self.bin_label(outcome.assigned_class),
        });

        if outcome.assigned_class >= self.bins.bin_count() {
            // A reconfigure shrank the bin set under an in-flight item.
            self.dispose(item, events);
            return;
        }
        if let Some(evicted) = self
            .bins
            .place(outcome.assigned_class, item, self.elapsed_ticks)
        {
            self.dispose(evicted, events);
        }
    }

    fn dispose(&mut self, mut item: Item, events: &mut Vec<TaskEvent>) {
        item.status = ItemStatus::Disposed;
        self.metrics.record_disposed();
        events.push(TaskEvent::Disposed {
            item_id: item.id,
            bin: item
                .assigned_class
                .map(|bin| self.bin_label(bin))
                .unwrap_or("conveyor"),
        });
    }

    fn bin_label(&self, bin: BinId) -> &'static str {
        self.config.policy.bin_label(bin)
    }

    fn step_per_tick(&self) -> f64 {
        // (halfway distance) / (speed / tick period): the head covers half the
        // conveyor in one task period.
        MIDPOINT / (self.config.speed_ms as f64 / TICK_MS as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Distractions;
    use crate::policy::TaskPolicy;

    fn config(policy: TaskPolicy, error_rate: f64) -> TaskConfig {
        TaskConfig {
            error_rate,
            speed_ms: 500,
            policy,
            distractions: Distractions::default(),
        }
    }

    fn sorting(error_rate: f64) -> TaskConfig {
        config(TaskPolicy::Sorting { num_colours: 2 }, error_rate)
    }

    fn run_ticks(task: &mut TaskSim, ticks: u64) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            events.extend(task.tick());
        }
        events
    }

    fn occupied_bin(task: &TaskSim) -> Option<(usize, u64)> {
        (0..task.bins().bin_count())
            .find_map(|bin| task.bins().occupant(bin).map(|item| (bin, item.id)))
    }

    fn tick_until_occupied(task: &mut TaskSim) -> (usize, u64) {
        for _ in 0..1_000 {
            task.tick();
            if let Some(found) = occupied_bin(task) {
                return found;
            }
        }
        panic!("no bin became occupied");
    }

    fn assert_conserved(task: &TaskSim) {
        assert_eq!(
            task.metrics().total_processed(),
            task.metrics().total_disposed() + task.bins().occupied() as u64,
            "classified items must be in a bin or disposed"
        );
        assert_eq!(
            task.total_spawned(),
            task.metrics().total_processed() + task.queue_len() as u64,
            "spawned items must be processed or still queued"
        );
    }

    #[test]
    fn start_spawns_the_first_item() {
        let mut task = TaskSim::with_seed(sorting(0.1), 1);
        let events = task.start();
        assert!(matches!(events[0], TaskEvent::Spawned { item_id: 0 }));
        assert!(task.is_running());
        assert_eq!(task.queue_len(), 1);
        assert_eq!(task.phase(), TaskPhase::Transporting);
    }

    #[test]
    fn ticks_before_start_are_noops() {
        let mut task = TaskSim::with_seed(sorting(0.1), 1);
        assert!(task.tick().is_empty());
        assert_eq!(task.elapsed_ticks(), 0);
    }

    #[test]
    fn head_is_classified_at_the_midpoint() {
        let mut task = TaskSim::with_seed(sorting(0.0), 2);
        task.start();
        // speed 500ms / 50ms ticks: ten advance ticks plus one classify tick.
        let events = run_ticks(&mut task, 11);
        let classified = events.iter().find_map(|event| match event {
            TaskEvent::Classified {
                item_id,
                assigned_class,
                destination_bin,
                error_occurred,
                ..
            } => Some((*item_id, *assigned_class, *destination_bin, *error_occurred)),
            _ => None,
        });
        let (item_id, assigned, destination, error) = classified.expect("head classified");
        assert_eq!(item_id, 0);
        assert_eq!(assigned, destination);
        assert!(!error);
        assert_eq!(task.metrics().total_processed(), 1);
        assert_eq!(task.bins().occupied(), 1);
    }

    #[test]
    fn zero_error_rate_run_is_perfectly_accurate() {
        let mut task = TaskSim::with_seed(sorting(0.0), 3);
        task.start();
        let mut ticks = 0u64;
        while task.metrics().total_processed() < 1_000 {
            task.tick();
            ticks += 1;
            assert!(ticks < 500_000, "run did not reach 1000 classifications");
        }
        assert_eq!(task.metrics().total_errors(), 0);
        assert_eq!(task.snapshot().accuracy_observed, 100.0);
        assert_conserved(&task);
    }

    #[test]
    fn pause_freezes_all_observable_state() {
        let mut task = TaskSim::with_seed(sorting(0.1), 4);
        task.start();
        run_ticks(&mut task, 37);

        let elapsed = task.elapsed_ticks();
        let queued = task.queue_len();
        let processed = task.metrics().total_processed();
        let phase = task.phase();

        task.pause();
        assert!(task.is_paused());
        let events = run_ticks(&mut task, 100);
        assert!(events.is_empty());
        assert_eq!(task.elapsed_ticks(), elapsed);
        assert_eq!(task.queue_len(), queued);
        assert_eq!(task.metrics().total_processed(), processed);
        assert_eq!(task.phase(), phase);

        task.resume();
        run_ticks(&mut task, 200);
        assert!(task.elapsed_ticks() > elapsed);
    }

    #[test]
    fn stop_drops_items_and_zeroes_counters() {
        let mut task = TaskSim::with_seed(sorting(0.1), 5);
        task.start();
        run_ticks(&mut task, 300);
        assert!(task.metrics().total_processed() > 0);

        task.stop();
        assert!(!task.is_running());
        assert_eq!(task.queue_len(), 0);
        assert_eq!(task.bins().occupied(), 0);
        assert_eq!(task.elapsed_ticks(), 0);
        assert_eq!(task.metrics().total_processed(), 0);
        assert_eq!(task.snapshot().accuracy_observed, 100.0);

        // A fresh run starts cleanly with fresh item ids.
        let events = task.start();
        assert!(matches!(events[0], TaskEvent::Spawned { item_id: 0 }));
    }

    #[test]
    fn slot_occupants_are_disposed_within_the_grace_period() {
        let mut task = TaskSim::with_seed(sorting(0.0), 6);
        task.start();
        let mut first_classified = None;
        for _ in 0..50 {
            for event in task.tick() {
                if let TaskEvent::Classified { item_id, .. } = event
                    && first_classified.is_none()
                {
                    first_classified = Some(item_id);
                }
            }
            if first_classified.is_some() {
                break;
            }
        }
        let target = first_classified.expect("an item classified");

        // Within the grace window it must be disposed, by expiry or eviction.
        let mut disposed = false;
        for _ in 0..GRACE_PERIOD_TICKS + 1 {
            for event in task.tick() {
                if matches!(event, TaskEvent::Disposed { item_id, .. } if item_id == target) {
                    disposed = true;
                }
            }
        }
        assert!(disposed, "slot occupant never disposed");
        assert_conserved(&task);
    }

    #[test]
    fn accepted_correction_moves_the_item_and_updates_counters() {
        // Near-saturated error rate: classifications are almost always misrouted.
        let mut task = TaskSim::with_seed(sorting(1.0), 7);
        task.start();
        let (bin, item_id) = tick_until_occupied(&mut task);
        let errors_before = task.metrics().total_errors();

        let other = 1 - bin;
        let mut events = task.select_error_bin(bin);
        events.extend(task.select_corrected_bin(other));

        let accepted = events.iter().any(|event| {
            matches!(event, TaskEvent::Correction { accepted: true, item_id: Some(id), .. } if *id == item_id)
        });
        assert!(accepted, "correction not accepted: {events:?}");
        assert_eq!(task.metrics().total_corrections(), 1);
        assert_eq!(
            task.metrics().total_errors(),
            errors_before.saturating_sub(1)
        );
        assert_eq!(task.bins().occupant(other).map(|i| i.id), Some(item_id));
        assert_conserved(&task);
    }

    #[test]
    fn rejected_corrections_never_touch_the_counters() {
        let mut task = TaskSim::with_seed(sorting(1.0), 8);
        task.start();
        let (bin, _) = tick_until_occupied(&mut task);
        let empty = 1 - bin;

        // Self-correction: same bin twice.
        let mut events = task.select_error_bin(bin);
        events.extend(task.select_corrected_bin(bin));
        assert!(events.iter().any(|event| matches!(
            event,
            TaskEvent::Correction {
                accepted: false,
                reason: Some(crate::correction::CorrectionRejection::NoErrorPresent),
                ..
            }
        )));

        // Empty bin selection.
        let events = task.select_error_bin(empty);
        assert!(events.iter().any(|event| matches!(
            event,
            TaskEvent::Correction {
                accepted: false,
                reason: Some(crate::correction::CorrectionRejection::EmptyBin),
                ..
            }
        )));

        assert_eq!(task.metrics().total_corrections(), 0);
        assert_eq!(task.correction_phase(), CorrectionPhase::Idle);
        assert_conserved(&task);
    }

    #[test]
    fn conservation_holds_across_a_long_mixed_run() {
        let mut task = TaskSim::with_seed(
            config(TaskPolicy::Sorting { num_colours: 3 }, 0.15),
            9,
        );
        task.start();
        for tick in 0..20_000u64 {
            task.tick();
            // Interleave operator corrections, valid and invalid alike.
            if tick % 97 == 0 {
                let from = (tick as usize / 97) % 3;
                let to = (from + 1) % 3;
                task.select_error_bin(from);
                task.select_corrected_bin(to);
            }
        }
        assert!(task.metrics().total_processed() > 100);
        assert_conserved(&task);
    }

    #[test]
    fn reconfigure_keeps_in_flight_items_and_rejects_bad_settings() {
        use crate::config::{TaskSettings, TaskSpecific};

        let mut task = TaskSim::with_seed(
            config(TaskPolicy::Sorting { num_colours: 3 }, 0.1),
            10,
        );
        task.start();
        run_ticks(&mut task, 200);
        let queued = task.queue_len();
        let processed = task.metrics().total_processed();

        let settings = TaskSettings {
            enabled: true,
            speed_ms: 1000,
            error_rate_percent: 5,
            task_specific: TaskSpecific::NumColours(2),
            distractions: Distractions::default(),
        };
        task.apply_settings(&settings).expect("valid settings");
        assert_eq!(task.queue_len(), queued);
        assert_eq!(task.metrics().total_processed(), processed);
        assert_eq!(task.bins().bin_count(), 2);
        assert_eq!(task.config().error_rate, 0.05);

        // Out-of-range settings leave the last-known-good config active.
        let mut bad = settings;
        bad.error_rate_percent = 99;
        assert!(task.apply_settings(&bad).is_err());
        assert_eq!(task.config().error_rate, 0.05);

        // Settings for another task kind are rejected outright.
        let mut wrong_kind = settings;
        wrong_kind.task_specific = TaskSpecific::PackageNum(5);
        assert!(matches!(
            task.apply_settings(&wrong_kind),
            Err(SettingsError::TaskKindMismatch { .. })
        ));

        run_ticks(&mut task, 2_000);
        assert_conserved(&task);
    }

    #[test]
    fn distraction_pulses_fire_when_enabled() {
        let mut task = TaskSim::with_seed(
            TaskConfig {
                error_rate: 0.1,
                speed_ms: 500,
                policy: TaskPolicy::Inspection {
                    accept_min_cm: 8.0,
                    accept_max_cm: 12.0,
                },
                distractions: Distractions(true, false),
            },
            11,
        );
        task.start();
        let events = run_ticks(&mut task, 1_000);
        assert!(events.iter().any(|event| matches!(
            event,
            TaskEvent::Distraction { light: true, sound: false }
        )));
    }
}
