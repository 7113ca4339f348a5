//! Errors that end a flash run without a workflow result

use dutflash_core::CollaboratorError;
use thiserror::Error;

use crate::report::ResultCode;

/// Flash run errors
#[derive(Debug, Error)]
pub enum FlashError {
    /// Build token could not be resolved or its artifact located.
    /// Nothing was flashed.
    #[error("Could not resolve build '{token}' on branch '{branch}': {source}")]
    Resolution {
        token: String,
        branch: String,
        #[source]
        source: CollaboratorError,
    },

    /// Tracking record could not be written
    #[error("Failed to write tracking record: {0}")]
    Tracking(#[source] std::io::Error),

    /// Attempt log could not be opened or written
    #[error("Failed to write attempt log: {0}")]
    AttemptLog(#[source] std::io::Error),

    /// Device was updated to `version` but bookkeeping afterwards failed
    #[error("Device updated to {version} but property sync failed: {source}")]
    Reconciliation {
        version: String,
        #[source]
        source: CollaboratorError,
    },
}

impl FlashError {
    /// Result code reported to the invoking harness
    pub fn result_code(&self) -> ResultCode {
        match self {
            FlashError::Resolution { .. } => ResultCode::Error,
            FlashError::Tracking(_) => ResultCode::Error,
            FlashError::AttemptLog(_) => ResultCode::Error,
            FlashError::Reconciliation { .. } => ResultCode::Error,
        }
    }

    /// Whether the device may have been modified before the error
    pub fn device_updated(&self) -> bool {
        matches!(self, FlashError::Reconciliation { .. })
    }
}

pub type Result<T> = std::result::Result<T, FlashError>;
