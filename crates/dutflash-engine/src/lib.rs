//! dutflash-engine - Flash orchestration for a device under test
//!
//! Drives one flash run end to end: resolve the requested build, skip the
//! work when the device already runs it, retry the update a bounded number
//! of times, classify the last attempt and sync the device properties.
//!
//! # Example
//!
//! ```rust,ignore
//! use dutflash_engine::{Collaborators, FlashOrchestrator, OrchestratorSettings};
//! use dutflash_core::UpdateRequest;
//!
//! let orchestrator = FlashOrchestrator::new(collaborators, OrchestratorSettings::new(download, logs));
//! let request = UpdateRequest::builder("latest").branch("main").build()?;
//! let report = orchestrator.run(&request, &mut device).await?;
//! println!("{}: {}", report.code(), report.message());
//! ```

mod attempt_log;
mod error;
mod orchestrator;
mod report;
pub mod testing;
mod tracking;

pub use attempt_log::AttemptLog;
pub use error::{FlashError, Result};
pub use orchestrator::{Collaborators, FlashOrchestrator, OrchestratorSettings};
pub use report::{FlashReport, ResultCode};
pub use tracking::TrackingRecord;

// Re-export core types for convenience
pub use dutflash_core::{
    AttemptOutcome, DeviceRecord, FailureReason, ImageKind, ResolvedBuild, UpdateRequest,
    WorkflowResult,
};
