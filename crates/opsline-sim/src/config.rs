/*
[INPUT]:  Operator-set parameters from the settings UI or a scenario file
[OUTPUT]: Validated runtime task configuration
[POS]:    Configuration layer - wire shape, validation, runtime snapshot
[UPDATE]: When adding new configuration options or validation rules
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{TaskKind, TaskPolicy};

const ERROR_RATE_PERCENT_RANGE: std::ops::RangeInclusive<u8> = 5..=15;
const SPEED_MS_RANGE: std::ops::RangeInclusive<u64> = 500..=10_000;
const NUM_COLOURS_RANGE: std::ops::RangeInclusive<u8> = 2..=3;
const PACKAGE_NUM_RANGE: std::ops::RangeInclusive<u32> = 4..=6;
const SIZE_RANGE_CM_RANGE: std::ops::RangeInclusive<u8> = 8..=12;

/// The accepted inspection band is symmetric about this centre; the
/// configured bound sets the upper edge.
const INSPECTION_BAND_CENTRE_CM: f64 = 10.0;

/// Validation failures for operator-supplied settings.
///
/// A rejected settings payload is never applied; the last-known-good
/// configuration stays active.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("error rate {value}% outside 5..=15%")]
    ErrorRateOutOfRange { value: u8 },
    #[error("speed {value}ms outside 500..=10000ms")]
    SpeedOutOfRange { value: u64 },
    #[error("colour count {value} outside 2..=3")]
    ColoursOutOfRange { value: u8 },
    #[error("package size {value} outside 4..=6")]
    PackageNumOutOfRange { value: u32 },
    #[error("size bound {value}cm outside 8..=12cm")]
    SizeRangeOutOfRange { value: u8 },
    #[error("settings are for the {got} task, expected {expected}")]
    TaskKindMismatch { expected: &'static str, got: &'static str },
}

/// Distraction channel flags, serialized as `[light, sound]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distractions(pub bool, pub bool);

impl Distractions {
    pub fn light(self) -> bool {
        self.0
    }

    pub fn sound(self) -> bool {
        self.1
    }

    pub fn any(self) -> bool {
        self.0 || self.1
    }
}

/// Task-specific configuration value; the key names the task family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskSpecific {
    /// Sorting: 2 or 3 colours.
    NumColours(u8),
    /// Packaging: items per box.
    PackageNum(u32),
    /// Inspection: accepted-range upper bound in centimetres.
    SizeRangeCm(u8),
}

impl TaskSpecific {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskSpecific::NumColours(_) => TaskKind::Sorting,
            TaskSpecific::PackageNum(_) => TaskKind::Packaging,
            TaskSpecific::SizeRangeCm(_) => TaskKind::Inspection,
        }
    }
}

/// Wire-shape settings for one task, as the settings UI and scenario files
/// carry them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSettings {
    pub enabled: bool,
    pub speed_ms: u64,
    pub error_rate_percent: u8,
    #[serde(flatten)]
    pub task_specific: TaskSpecific,
    pub distractions: Distractions,
}

impl TaskSettings {
    /// Reject out-of-range values before they can be applied.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !ERROR_RATE_PERCENT_RANGE.contains(&self.error_rate_percent) {
            return Err(SettingsError::ErrorRateOutOfRange {
                value: self.error_rate_percent,
            });
        }
        if !SPEED_MS_RANGE.contains(&self.speed_ms) {
            return Err(SettingsError::SpeedOutOfRange {
                value: self.speed_ms,
            });
        }
        match self.task_specific {
            TaskSpecific::NumColours(value) if !NUM_COLOURS_RANGE.contains(&value) => {
                Err(SettingsError::ColoursOutOfRange { value })
            }
            TaskSpecific::PackageNum(value) if !PACKAGE_NUM_RANGE.contains(&value) => {
                Err(SettingsError::PackageNumOutOfRange { value })
            }
            TaskSpecific::SizeRangeCm(value) if !SIZE_RANGE_CM_RANGE.contains(&value) => {
                Err(SettingsError::SizeRangeOutOfRange { value })
            }
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.task_specific.kind()
    }
}

/// Immutable runtime snapshot of one task's parameters.
///
/// Replacing it mid-run never corrupts in-flight items; the new snapshot
/// applies to subsequent spawns and classifications only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskConfig {
    /// Error probability in 0.0..=1.0, jittered per evaluation.
    pub error_rate: f64,
    /// Task period; transport covers half the conveyor in this time.
    pub speed_ms: u64,
    pub policy: TaskPolicy,
    pub distractions: Distractions,
}

impl TaskConfig {
    /// Validate wire settings and build the runtime snapshot.
    pub fn from_settings(settings: &TaskSettings) -> Result<Self, SettingsError> {
        settings.validate()?;

        let policy = match settings.task_specific {
            TaskSpecific::NumColours(num_colours) => TaskPolicy::Sorting { num_colours },
            TaskSpecific::PackageNum(capacity) => TaskPolicy::Packaging { capacity },
            TaskSpecific::SizeRangeCm(bound) => {
                let accept_max_cm = bound as f64;
                let accept_min_cm = 2.0 * INSPECTION_BAND_CENTRE_CM - accept_max_cm;
                TaskPolicy::Inspection {
                    accept_min_cm,
                    accept_max_cm,
                }
            }
        };

        Ok(Self {
            error_rate: settings.error_rate_percent as f64 / 100.0,
            speed_ms: settings.speed_ms,
            policy,
            distractions: settings.distractions,
        })
    }
}
