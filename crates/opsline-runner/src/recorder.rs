/*
[INPUT]:  Metric snapshots and task events from running sessions
[OUTPUT]: Append-only metrics.csv and events.csv record streams
[POS]:    Data collection layer - CSV persistence and ID bookkeeping
[UPDATE]: When row shapes or session ID rules change
*/

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use opsline_sim::policy::TaskKind;

const METRICS_HEADER: &str =
    "timestamp,session_id,participant_id,metric_type,task_type,value,unit";
const EVENTS_HEADER: &str = "timestamp,session_id,participant_id,event_type,task_type,details";

/// Append-only CSV recorder for one session.
///
/// Headers are written once at file creation; every later open appends.
/// Session IDs continue from the last recorded row.
#[derive(Debug)]
pub struct DataRecorder {
    metrics_file: File,
    events_file: File,
    session_id: String,
    participant_id: String,
}

impl DataRecorder {
    /// Open (or create) the record streams under `results_dir`.
    pub fn open(results_dir: &Path, participant: u32) -> Result<Self> {
        std::fs::create_dir_all(results_dir)
            .with_context(|| format!("create results dir {}", results_dir.display()))?;

        let metrics_path = results_dir.join("metrics.csv");
        let events_path = results_dir.join("events.csv");

        ensure_file_with_header(&metrics_path, METRICS_HEADER)?;
        ensure_file_with_header(&events_path, EVENTS_HEADER)?;

        let session_id = next_session_id(&events_path)?;

        let metrics_file = OpenOptions::new()
            .append(true)
            .open(&metrics_path)
            .with_context(|| format!("open {}", metrics_path.display()))?;
        let events_file = OpenOptions::new()
            .append(true)
            .open(&events_path)
            .with_context(|| format!("open {}", events_path.display()))?;

        Ok(Self {
            metrics_file,
            events_file,
            session_id,
            participant_id: format!("P{participant:03}"),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Append one metric row.
    pub fn record_metric(
        &mut self,
        metric_type: &str,
        task: TaskKind,
        value: f64,
        unit: &str,
    ) -> Result<()> {
        let row = format!(
            "{},{},{},{},{},{},{}",
            chrono::Utc::now().to_rfc3339(),
            self.session_id,
            self.participant_id,
            csv_field(metric_type),
            csv_field(task_label(task)),
            value,
            csv_field(unit),
        );
        writeln!(self.metrics_file, "{row}").context("append metric row")?;
        Ok(())
    }

    /// Append one event row.
    pub fn record_event(&mut self, event_type: &str, task: TaskKind, details: &str) -> Result<()> {
        let row = format!(
            "{},{},{},{},{},{}",
            chrono::Utc::now().to_rfc3339(),
            self.session_id,
            self.participant_id,
            csv_field(event_type),
            csv_field(task_label(task)),
            csv_field(details),
        );
        writeln!(self.events_file, "{row}").context("append event row")?;
        Ok(())
    }
}

fn task_label(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Sorting => "Sorting Task",
        TaskKind::Packaging => "Packaging Task",
        TaskKind::Inspection => "Inspection Task",
    }
}

fn ensure_file_with_header(path: &Path, header: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let mut file =
        File::create(path).with_context(|| format!("create {}", path.display()))?;
    writeln!(file, "{header}").context("write header")?;
    Ok(())
}

/// Continue the `S###` sequence from the last recorded row.
fn next_session_id(events_path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(events_path)
        .with_context(|| format!("read {}", events_path.display()))?;

    let last_session = content
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| line.split(',').nth(1))
        .last();

    let next = match last_session.and_then(parse_session_number) {
        Some(number) => number + 1,
        None => 1,
    };
    Ok(format!("S{next:03}"))
}

fn parse_session_number(session_id: &str) -> Option<u32> {
    session_id.strip_prefix('S')?.parse().ok()
}

/// Quote a field when it contains CSV metacharacters.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
