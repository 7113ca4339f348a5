//! Attempt outcomes and terminal workflow results

use serde::{Deserialize, Serialize};

/// Why a single update attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum FailureReason {
    /// Artifact could not be downloaded or staged
    Download,
    /// Device did not respond or was not found
    DeviceUnavailable,
    /// Transfer of the image to the device failed
    Transfer,
    /// Device rejected the image after transfer
    Verification,
    /// Update tool gave up waiting
    Timeout,
    /// Anything else, with a description
    Other(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Download => f.write_str("download failed"),
            FailureReason::DeviceUnavailable => f.write_str("device unavailable"),
            FailureReason::Transfer => f.write_str("transfer failed"),
            FailureReason::Verification => f.write_str("verification failed"),
            FailureReason::Timeout => f.write_str("timed out"),
            FailureReason::Other(detail) => write!(f, "{}", detail),
        }
    }
}

/// Result of one update attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Device accepted the update. `version` is `None` when the device's
    /// post-update version could not be determined.
    Success { version: Option<String> },
    /// Attempt failed
    Failure { reason: FailureReason },
}

impl AttemptOutcome {
    pub fn success(version: impl Into<String>) -> Self {
        AttemptOutcome::Success {
            version: Some(version.into()),
        }
    }

    pub fn success_without_version() -> Self {
        AttemptOutcome::Success { version: None }
    }

    pub fn failure(reason: FailureReason) -> Self {
        AttemptOutcome::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

/// Terminal result of a flash run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum WorkflowResult {
    /// Device already on target; caller asked for a silent abort
    AlreadyOnBuildAborted,
    /// Device already on target; reported as a normal completion
    AlreadyOnBuildReported,
    /// Update applied and the device reports `version`
    UpdateSucceeded { version: String },
    /// Every attempt failed; carries the last failure
    UpdateFailedExhausted { reason: FailureReason },
    /// Device accepted the update but its version could not be confirmed
    UpdateSucceededButVersionUnknown,
}

impl WorkflowResult {
    /// Classify the outcome of the last attempt
    pub fn classify(last: &AttemptOutcome) -> Self {
        match last {
            AttemptOutcome::Failure { reason } => WorkflowResult::UpdateFailedExhausted {
                reason: reason.clone(),
            },
            AttemptOutcome::Success { version: None } => {
                WorkflowResult::UpdateSucceededButVersionUnknown
            }
            AttemptOutcome::Success {
                version: Some(version),
            } => WorkflowResult::UpdateSucceeded {
                version: version.clone(),
            },
        }
    }

    /// Whether any update attempt was made to reach this result
    pub fn attempted(&self) -> bool {
        !matches!(
            self,
            WorkflowResult::AlreadyOnBuildAborted | WorkflowResult::AlreadyOnBuildReported
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempted() {
        assert!(!WorkflowResult::AlreadyOnBuildAborted.attempted());
        assert!(!WorkflowResult::AlreadyOnBuildReported.attempted());
        assert!(WorkflowResult::UpdateSucceededButVersionUnknown.attempted());
        assert!(WorkflowResult::UpdateFailedExhausted {
            reason: FailureReason::Transfer
        }
        .attempted());
    }

    #[test]
    fn test_classify_last_attempt() {
        assert_eq!(
            WorkflowResult::classify(&AttemptOutcome::failure(FailureReason::Transfer)),
            WorkflowResult::UpdateFailedExhausted {
                reason: FailureReason::Transfer
            }
        );
        assert_eq!(
            WorkflowResult::classify(&AttemptOutcome::success_without_version()),
            WorkflowResult::UpdateSucceededButVersionUnknown
        );
        assert_eq!(
            WorkflowResult::classify(&AttemptOutcome::success("1.2.3")),
            WorkflowResult::UpdateSucceeded {
                version: "1.2.3".into()
            }
        );
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::Download.to_string(), "download failed");
        assert_eq!(
            FailureReason::Other("exit status 9".into()).to_string(),
            "exit status 9"
        );
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(WorkflowResult::UpdateSucceeded {
            version: "7".into(),
        })
        .unwrap();
        assert_eq!(json["result"], "update_succeeded");
        assert_eq!(json["version"], "7");
    }
}
