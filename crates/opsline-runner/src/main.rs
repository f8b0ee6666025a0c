/*
[INPUT]:  CLI arguments, scenario JSON file, OS shutdown signals
[OUTPUT]: Running task simulations with CSV recording and graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opsline_runner::{DataRecorder, Scenario, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "opsline-runner", version, about = "Operator process-line training simulator")]
struct Cli {
    #[arg(long = "scenario", value_name = "PATH")]
    scenario_path: PathBuf,
    #[arg(long = "results-dir", value_name = "DIR", default_value = "results")]
    results_dir: PathBuf,
    #[arg(long = "participant", value_name = "N", default_value_t = 1)]
    participant: u32,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "duration-secs", value_name = "SECS")]
    duration_secs: Option<u64>,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        scenario = %args.scenario_path.display(),
        dry_run = args.dry_run,
        "starting opsline-runner"
    );

    let scenario = Scenario::from_file(&args.scenario_path)?;
    scenario.validate().context("invalid scenario")?;
    info!("scenario loaded");

    if args.dry_run {
        info!("dry-run requested; scenario validated");
        return Ok(());
    }

    let recorder =
        DataRecorder::open(&args.results_dir, args.participant).context("open data recorder")?;
    info!(
        session_id = recorder.session_id(),
        participant_id = recorder.participant_id(),
        "data recorder ready"
    );

    let mut session = SessionManager::new(recorder);
    let shutdown = session.shutdown_token();
    setup_signal_handlers(shutdown.clone());

    session
        .spawn_from_scenario(&scenario)
        .context("spawn tasks from scenario")?;
    if session.task_count() == 0 {
        warn!("no tasks enabled in scenario; nothing to run");
        return Ok(());
    }
    info!(task_count = session.task_count(), "tasks started");

    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "configured duration elapsed");
                    shutdown.cancel();
                }
            }
        }
        None => shutdown.cancelled().await,
    }
    info!("shutdown requested");

    session
        .shutdown_and_wait()
        .await
        .context("shutdown tasks")?;
    info!("session shutdown complete");

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
