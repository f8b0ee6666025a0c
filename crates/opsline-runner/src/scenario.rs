/*
[INPUT]:  Scenario JSON files saved by the settings UI
[OUTPUT]: Parsed per-task settings for a session
[POS]:    Persistence layer - scenario load/save, lossless round-trip
[UPDATE]: When the scenario document shape changes
*/

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use opsline_sim::config::{Distractions, SettingsError, TaskSettings, TaskSpecific};
use opsline_sim::policy::TaskKind;

/// Persisted scenario: one settings block per task type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub sorting_task: TaskSettings,
    pub packaging_task: TaskSettings,
    pub inspection_task: TaskSettings,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        let scenario: Self = serde_json::from_str(&content)
            .with_context(|| format!("parse scenario {}", path.display()))?;
        Ok(scenario)
    }

    /// Save the scenario as pretty-printed JSON; `load(save(x)) == x`.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("serialize scenario")?;
        std::fs::write(path, content)
            .with_context(|| format!("write scenario {}", path.display()))?;
        Ok(())
    }

    /// Validate every block and check each sits under the right key.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (expected, settings) in self.blocks() {
            settings.validate()?;
            if settings.kind() != expected {
                return Err(SettingsError::TaskKindMismatch {
                    expected: expected.as_str(),
                    got: settings.kind().as_str(),
                });
            }
        }
        Ok(())
    }

    /// The three settings blocks with the task kind their key names.
    pub fn blocks(&self) -> [(TaskKind, &TaskSettings); 3] {
        [
            (TaskKind::Sorting, &self.sorting_task),
            (TaskKind::Packaging, &self.packaging_task),
            (TaskKind::Inspection, &self.inspection_task),
        ]
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            sorting_task: TaskSettings {
                enabled: true,
                speed_ms: 8000,
                error_rate_percent: 10,
                task_specific: TaskSpecific::NumColours(2),
                distractions: Distractions::default(),
            },
            packaging_task: TaskSettings {
                enabled: false,
                speed_ms: 8000,
                error_rate_percent: 9,
                task_specific: TaskSpecific::PackageNum(6),
                distractions: Distractions::default(),
            },
            inspection_task: TaskSettings {
                enabled: false,
                speed_ms: 8000,
                error_rate_percent: 5,
                task_specific: TaskSpecific::SizeRangeCm(12),
                distractions: Distractions::default(),
            },
        }
    }
}
