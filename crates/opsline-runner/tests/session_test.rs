/*
[INPUT]:  Session manager driving real task loops against temp directories
[OUTPUT]: End-to-end checks of run, command handling, and recording
[POS]:    Integration test layer - full runner verification
[UPDATE]: When adding new session scenarios
*/

use std::time::Duration;

use opsline_runner::{DataRecorder, Scenario, SessionManager, TaskCommand};
use opsline_sim::policy::TaskKind;

fn fast_scenario() -> Scenario {
    let mut scenario = Scenario::default();
    scenario.sorting_task.enabled = true;
    scenario.sorting_task.speed_ms = 500;
    scenario.sorting_task.error_rate_percent = 15;
    scenario
}

#[tokio::test]
async fn session_runs_ticks_and_records_streams() {
    let dir = tempfile::tempdir().expect("tempdir");
    let recorder = DataRecorder::open(dir.path(), 1).expect("recorder");

    let mut session = SessionManager::new(recorder);
    session
        .spawn_from_scenario(&fast_scenario())
        .expect("spawn tasks");
    assert_eq!(session.task_count(), 1);

    // Let the loop classify a few items, exercise pause/resume and a
    // correction request along the way.
    tokio::time::sleep(Duration::from_millis(700)).await;
    session
        .send(TaskKind::Sorting, TaskCommand::Pause)
        .expect("pause");
    tokio::time::sleep(Duration::from_millis(150)).await;
    session
        .send(TaskKind::Sorting, TaskCommand::Resume)
        .expect("resume");
    session
        .send(TaskKind::Sorting, TaskCommand::SelectErrorBin(0))
        .expect("select error bin");
    session
        .send(TaskKind::Sorting, TaskCommand::SelectCorrectedBin(1))
        .expect("select corrected bin");
    tokio::time::sleep(Duration::from_millis(700)).await;

    session.shutdown_and_wait().await.expect("shutdown");

    let events = std::fs::read_to_string(dir.path().join("events.csv")).expect("events file");
    assert!(events.lines().count() > 1, "no event rows: {events}");
    assert!(events.contains("spawned"));
    assert!(events.contains("classified"));
    assert!(events.contains("correction"));

    let metrics = std::fs::read_to_string(dir.path().join("metrics.csv")).expect("metrics file");
    assert!(metrics.contains("Throughput"));
    assert!(metrics.contains("User Accuracy"));
}

#[tokio::test]
async fn commands_to_disabled_tasks_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let recorder = DataRecorder::open(dir.path(), 1).expect("recorder");

    let mut session = SessionManager::new(recorder);
    session
        .spawn_from_scenario(&fast_scenario())
        .expect("spawn tasks");

    assert!(session.send(TaskKind::Packaging, TaskCommand::Pause).is_err());
    session.shutdown_and_wait().await.expect("shutdown");
}

#[tokio::test]
async fn duplicate_task_kinds_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let recorder = DataRecorder::open(dir.path(), 1).expect("recorder");

    let mut session = SessionManager::new(recorder);
    session
        .spawn_from_scenario(&fast_scenario())
        .expect("spawn tasks");
    let err = session
        .spawn_from_scenario(&fast_scenario())
        .expect_err("duplicate kind");
    assert!(err.to_string().contains("duplicate"));

    session.shutdown_and_wait().await.expect("shutdown");
}

#[tokio::test]
async fn stop_command_is_applied_at_the_tick_boundary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let recorder = DataRecorder::open(dir.path(), 1).expect("recorder");

    let mut session = SessionManager::new(recorder);
    session
        .spawn_from_scenario(&fast_scenario())
        .expect("spawn tasks");

    tokio::time::sleep(Duration::from_millis(300)).await;
    session
        .send(TaskKind::Sorting, TaskCommand::Stop)
        .expect("stop");
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A stopped task can start a fresh run in the same loop.
    session
        .send(TaskKind::Sorting, TaskCommand::Start)
        .expect("restart");
    tokio::time::sleep(Duration::from_millis(200)).await;

    session.shutdown_and_wait().await.expect("shutdown");
}
