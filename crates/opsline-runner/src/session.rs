/*
[INPUT]:  Scenario settings, operator commands, CancellationToken shutdown
[OUTPUT]: Tokio task loops driving one TaskSim each at the 50 ms base tick
[POS]:    Execution layer - per-task session orchestration
[UPDATE]: When changing tick cadence, command handling, or shutdown semantics
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use opsline_sim::config::{TaskConfig, TaskSettings};
use opsline_sim::events::TaskEvent;
use opsline_sim::policy::TaskKind;
use opsline_sim::task::{TICK_MS, TaskSim};

use crate::recorder::DataRecorder;
use crate::scenario::Scenario;

/// Metrics are polled and recorded every this many ticks (1 s).
pub const METRICS_POLL_TICKS: u64 = 20;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Operator commands addressed to one task.
///
/// Commands are drained at the start of the next tick - never mid-tick - so
/// the operator can never observe partially-updated item state.
#[derive(Debug, Clone)]
pub enum TaskCommand {
    Start,
    Pause,
    Resume,
    Stop,
    SelectErrorBin(usize),
    SelectCorrectedBin(usize),
    ApplySettings(TaskSettings),
}

#[derive(Debug)]
struct ManagedTask {
    command_tx: mpsc::UnboundedSender<TaskCommand>,
    handle: JoinHandle<Result<()>>,
}

/// Session manager coordinating the per-task simulation loops.
#[derive(Debug)]
pub struct SessionManager {
    tasks: HashMap<TaskKind, ManagedTask>,
    recorder: Arc<Mutex<DataRecorder>>,
    shutdown: CancellationToken,
    run_id: Uuid,
}

impl SessionManager {
    pub fn new(recorder: DataRecorder) -> Self {
        Self {
            tasks: HashMap::new(),
            recorder: Arc::new(Mutex::new(recorder)),
            shutdown: CancellationToken::new(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn a loop for every enabled task in the scenario.
    ///
    /// Each task owns an independent queue and bin set; nothing is shared
    /// across task types except the recorder.
    pub fn spawn_from_scenario(&mut self, scenario: &Scenario) -> Result<()> {
        for (kind, settings) in scenario.blocks() {
            if !settings.enabled {
                continue;
            }
            let config = TaskConfig::from_settings(settings)
                .with_context(|| format!("settings for the {} task", kind.as_str()))?;
            self.spawn_task(config)?;
        }
        Ok(())
    }

    fn spawn_task(&mut self, config: TaskConfig) -> Result<()> {
        let kind = config.policy.kind();
        if self.tasks.contains_key(&kind) {
            return Err(anyhow!("duplicate task kind: {}", kind.as_str()));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shutdown = self.shutdown.child_token();
        let recorder = self.recorder.clone();
        let run_id = self.run_id;

        info!(
            run_id = %run_id,
            task = kind.as_str(),
            error_rate = config.error_rate,
            speed_ms = config.speed_ms,
            "spawning task loop"
        );
        let handle =
            tokio::spawn(task_loop(TaskSim::new(config), command_rx, recorder, shutdown));
        self.tasks.insert(kind, ManagedTask { command_tx, handle });
        Ok(())
    }

    /// Queue an operator command; it applies at the next tick boundary.
    pub fn send(&self, kind: TaskKind, command: TaskCommand) -> Result<()> {
        let task = self
            .tasks
            .get(&kind)
            .ok_or_else(|| anyhow!("no running {} task", kind.as_str()))?;
        task.command_tx
            .send(command)
            .map_err(|_| anyhow!("{} task loop has exited", kind.as_str()))
    }

    /// Request graceful shutdown and wait for every loop, bounded in time.
    pub async fn shutdown_and_wait(&mut self) -> Result<()> {
        self.shutdown.cancel();
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;

        let mut tasks: Vec<(TaskKind, ManagedTask)> = self.tasks.drain().collect();
        while let Some((kind, task)) = tasks.pop() {
            let mut handle = task.handle;
            tokio::select! {
                res = &mut handle => match res {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        abort_all(tasks);
                        return Err(err)
                            .with_context(|| format!("{} task loop failed", kind.as_str()));
                    }
                    Err(join_err) => {
                        abort_all(tasks);
                        return Err(anyhow!(
                            "{} task loop join error: {join_err}",
                            kind.as_str()
                        ));
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    handle.abort();
                    abort_all(tasks);
                    return Err(anyhow!("shutdown timed out after {SHUTDOWN_TIMEOUT:?}"));
                }
            }
        }
        Ok(())
    }
}

fn abort_all(tasks: Vec<(TaskKind, ManagedTask)>) {
    for (_kind, task) in tasks {
        task.handle.abort();
    }
}

async fn task_loop(
    mut sim: TaskSim,
    mut command_rx: mpsc::UnboundedReceiver<TaskCommand>,
    recorder: Arc<Mutex<DataRecorder>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let events = sim.start();
    record_events(&recorder, sim.kind(), &events).await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(task = sim.kind().as_str(), "task loop shutdown requested");
                record_snapshot(&recorder, &sim).await?;
                return Ok(());
            }
            _ = interval.tick() => {
                let mut events = Vec::new();
                while let Ok(command) = command_rx.try_recv() {
                    apply_command(&mut sim, command, &mut events);
                }
                events.extend(sim.tick());
                record_events(&recorder, sim.kind(), &events).await?;

                if sim.elapsed_ticks() > 0 && sim.elapsed_ticks() % METRICS_POLL_TICKS == 0 {
                    record_snapshot(&recorder, &sim).await?;
                }
            }
        }
    }
}

fn apply_command(sim: &mut TaskSim, command: TaskCommand, events: &mut Vec<TaskEvent>) {
    match command {
        TaskCommand::Start => events.extend(sim.start()),
        TaskCommand::Pause => sim.pause(),
        TaskCommand::Resume => sim.resume(),
        TaskCommand::Stop => sim.stop(),
        TaskCommand::SelectErrorBin(bin) => events.extend(sim.select_error_bin(bin)),
        TaskCommand::SelectCorrectedBin(bin) => events.extend(sim.select_corrected_bin(bin)),
        TaskCommand::ApplySettings(settings) => match sim.apply_settings(&settings) {
            Ok(more) => events.extend(more),
            Err(err) => warn!(
                task = sim.kind().as_str(),
                error = %err,
                "settings rejected; keeping previous configuration"
            ),
        },
    }
}

async fn record_events(
    recorder: &Arc<Mutex<DataRecorder>>,
    kind: TaskKind,
    events: &[TaskEvent],
) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let mut recorder = recorder.lock().await;
    for event in events {
        let (event_type, details) = event_row(event);
        recorder.record_event(event_type, kind, &details)?;
    }
    Ok(())
}

fn event_row(event: &TaskEvent) -> (&'static str, String) {
    match event {
        TaskEvent::Spawned { item_id } => ("spawned", format!("item={item_id}")),
        TaskEvent::Classified {
            item_id,
            true_class,
            assigned_class,
            error_occurred,
            destination_bin,
        } => (
            "classified",
            format!(
                "item={item_id} true={true_class} assigned={assigned_class} \
                 error={error_occurred} bin={destination_bin}"
            ),
        ),
        TaskEvent::Correction {
            item_id,
            from_bin,
            to_bin,
            accepted,
            reason,
        } => {
            let item = item_id.map_or_else(|| "-".to_string(), |id| id.to_string());
            let to = to_bin.unwrap_or("-");
            let reason = reason.map_or_else(String::new, |r| format!(" reason={r}"));
            (
                "correction",
                format!("item={item} from={from_bin} to={to} accepted={accepted}{reason}"),
            )
        }
        TaskEvent::Disposed { item_id, bin } => {
            ("disposed", format!("item={item_id} bin={bin}"))
        }
        TaskEvent::Distraction { light, sound } => {
            ("distraction", format!("light={light} sound={sound}"))
        }
    }
}

async fn record_snapshot(recorder: &Arc<Mutex<DataRecorder>>, sim: &TaskSim) -> Result<()> {
    let snapshot = sim.snapshot();
    let kind = sim.kind();

    // The snapshot throughput is per tick; the record stream reports per second.
    let per_second = snapshot.throughput * 1000.0 / TICK_MS as f64;

    let mut recorder = recorder.lock().await;
    recorder.record_metric("Throughput", kind, per_second, "box / s")?;
    recorder.record_metric("Actual Error Rate", kind, snapshot.error_rate_observed, "%")?;
    recorder.record_metric("User Accuracy", kind, snapshot.accuracy_observed, "%")?;
    recorder.record_metric(
        "Corrections",
        kind,
        snapshot.corrections_count as f64,
        "box",
    )?;
    Ok(())
}
