//! Result codes and the report returned from a flash run

use dutflash_core::{ResolvedBuild, WorkflowResult};
use serde::{Deserialize, Serialize};

use crate::tracking::TrackingRecord;

/// Closed set of codes surfaced to the invoking harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// Device updated and verified
    Success,
    /// Device was already on the requested build
    AlreadyOnBuild,
    /// Update failed or could not be confirmed
    Failed,
    /// Run aborted because the device was already on the requested build
    Aborted,
    /// Run could not complete (resolution or bookkeeping failure)
    Error,
}

impl ResultCode {
    /// Numeric code, HTTP-style
    pub fn as_u16(&self) -> u16 {
        match self {
            ResultCode::Success => 200,
            ResultCode::AlreadyOnBuild => 202,
            ResultCode::Failed => 400,
            ResultCode::Aborted => 410,
            ResultCode::Error => 500,
        }
    }

    /// Whether the harness should treat this code as a passing run
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ResultCode::Success | ResultCode::AlreadyOnBuild | ResultCode::Aborted
        )
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultCode::Success => "success",
            ResultCode::AlreadyOnBuild => "already_on_build",
            ResultCode::Failed => "failed",
            ResultCode::Aborted => "aborted",
            ResultCode::Error => "error",
        };
        write!(f, "{} ({})", s, self.as_u16())
    }
}

/// Everything a caller needs to know about a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashReport {
    pub result: WorkflowResult,
    /// Build the run targeted
    pub build: ResolvedBuild,
    /// Number of update attempts made (0 when the idempotency gate ended the run)
    pub attempts: u32,
    /// Last content handed to the build tracker
    pub tracking: TrackingRecord,
}

impl FlashReport {
    pub fn code(&self) -> ResultCode {
        match &self.result {
            WorkflowResult::AlreadyOnBuildAborted => ResultCode::Aborted,
            WorkflowResult::AlreadyOnBuildReported => ResultCode::AlreadyOnBuild,
            WorkflowResult::UpdateSucceeded { .. } => ResultCode::Success,
            WorkflowResult::UpdateFailedExhausted { .. } => ResultCode::Failed,
            WorkflowResult::UpdateSucceededButVersionUnknown => ResultCode::Failed,
        }
    }

    /// Human-readable explanation of the result
    pub fn message(&self) -> String {
        match &self.result {
            WorkflowResult::AlreadyOnBuildAborted => {
                "Device was already on the build. Aborting".to_string()
            }
            WorkflowResult::AlreadyOnBuildReported => {
                format!("Device was already on build {}", self.build.build_number)
            }
            WorkflowResult::UpdateSucceeded { version } => {
                format!("Device updated to build {}", version)
            }
            WorkflowResult::UpdateFailedExhausted { reason } => format!(
                "Device did not update successfully after {} attempt(s): {}",
                self.attempts, reason
            ),
            WorkflowResult::UpdateSucceededButVersionUnknown => {
                "Device updated but failed to get build".to_string()
            }
        }
    }
}
