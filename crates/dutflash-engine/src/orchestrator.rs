//! Flash orchestration workflow
//!
//! One run walks through these phases:
//!
//! ```text
//! plan ──► track ──► idempotency gate ──► attempts ──► classify ──► reconcile
//!                     │ (skipped when forced                        (success with
//!                     │  or artifact missing)                        known version)
//!                     ▼
//!              already on build
//!           (reported or aborted)
//! ```
//!
//! Every phase is sequential. The only resource held across phases is the
//! attempt log, which exists only while attempts run.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use dutflash_core::{
    AttemptOutcome, AttemptRequest, BuildResolver, BuildTracker, CollaboratorError,
    CommandHistory, DeviceHandle, DeviceRecord, DeviceState, FailureReason, PropertySink,
    ResolvedBuild, UpdateRequest, WorkflowResult, PROP_BRANCH, PROP_BUILD, PROP_DEVICE_BUILD,
};
use tracing::{debug, info, instrument, warn};

use crate::attempt_log::AttemptLog;
use crate::error::{FlashError, Result};
use crate::report::FlashReport;
use crate::tracking::TrackingRecord;

/// The external systems a run depends on
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn BuildResolver>,
    pub device: Arc<dyn DeviceHandle>,
    pub properties: Arc<dyn PropertySink>,
    pub tracker: Arc<dyn BuildTracker>,
    pub history: Arc<dyn CommandHistory>,
}

/// Local paths used by a run
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Where builds are downloaded/staged
    pub download_path: PathBuf,
    /// Attempt log file
    pub log_path: PathBuf,
}

impl OrchestratorSettings {
    /// File name of the attempt log inside the log directory
    pub const LOG_FILE_NAME: &'static str = "flash.log";

    pub fn new(download_path: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_path: download_path.into(),
            log_path: log_dir.into().join(Self::LOG_FILE_NAME),
        }
    }
}

/// Drives one device from "requested build" to a terminal result
pub struct FlashOrchestrator {
    collaborators: Collaborators,
    settings: OrchestratorSettings,
}

impl FlashOrchestrator {
    pub fn new(collaborators: Collaborators, settings: OrchestratorSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run the whole workflow for `device`.
    ///
    /// `device` is updated in place when the flash succeeds. Errors are
    /// reserved for runs that could not reach a workflow result: nothing to
    /// flash could be determined, or the device was updated but the
    /// bookkeeping afterwards failed.
    #[instrument(skip_all, fields(device = %device.name, token = %request.build_token(), branch = %request.branch()))]
    pub async fn run(
        &self,
        request: &UpdateRequest,
        device: &mut DeviceRecord,
    ) -> Result<FlashReport> {
        info!("Build requested {}", request.build_token());
        let build = self.plan(request).await?;

        let mut tracking = TrackingRecord::target(request.image_kind(), &build.build_number);
        self.track(&tracking)?;

        if !request.force_flash() {
            if let Some(state) = self.installed_state(&build, device).await {
                if state.matches(&build.build_number, request.image_kind(), request.branch()) {
                    let result = if request.abort_if_on_build() {
                        tracking = TrackingRecord::Abort;
                        self.track(&tracking)?;
                        info!("Device already on build {}, aborting", build.build_number);
                        WorkflowResult::AlreadyOnBuildAborted
                    } else {
                        info!("Device already on build {}", build.build_number);
                        WorkflowResult::AlreadyOnBuildReported
                    };
                    return Ok(FlashReport {
                        result,
                        build,
                        attempts: 0,
                        tracking,
                    });
                }
                debug!(
                    installed = %state.installed_version,
                    kind = %state.installed_image_kind,
                    "Device differs from target"
                );
            }
        }

        info!(
            "Flashing build {} from branch \"{}\" with \"{}\" image",
            build.build_number,
            request.branch(),
            request.image_kind()
        );
        let (last, attempts) = self.attempt_updates(&build, request, device).await?;

        let result = WorkflowResult::classify(&last);
        match &result {
            WorkflowResult::UpdateFailedExhausted { reason } => {
                warn!("Flash failed after {} attempt(s): {}", attempts, reason);
            }
            WorkflowResult::UpdateSucceededButVersionUnknown => {
                warn!("Device updated but failed to get device build after update");
            }
            WorkflowResult::UpdateSucceeded { version } => {
                info!("Flash success, device build after update {}", version);
                self.reconcile(request, device, version).await?;
            }
            WorkflowResult::AlreadyOnBuildAborted | WorkflowResult::AlreadyOnBuildReported => {}
        }

        Ok(FlashReport {
            result,
            build,
            attempts,
            tracking,
        })
    }

    /// Resolve the request into the one build every attempt targets
    #[instrument(skip(self, request), fields(token = %request.build_token()))]
    pub async fn plan(&self, request: &UpdateRequest) -> Result<ResolvedBuild> {
        let resolution_error = |source| FlashError::Resolution {
            token: request.build_token().to_string(),
            branch: request.branch().to_string(),
            source,
        };

        let info = self
            .collaborators
            .resolver
            .resolve(request.build_token(), request.branch())
            .await
            .map_err(resolution_error)?;

        let artifact_path = self
            .collaborators
            .resolver
            .locate_artifact(
                request.branch(),
                &info.build_number,
                &self.settings.download_path,
            )
            .await
            .map_err(resolution_error)?;

        debug!(build = %info.build_number, artifact = %artifact_path.display(), "Resolved build");
        Ok(ResolvedBuild {
            build_number: info.build_number,
            artifact_path,
        })
    }

    fn track(&self, record: &TrackingRecord) -> Result<()> {
        self.collaborators
            .tracker
            .record(&record.to_string())
            .map_err(FlashError::Tracking)
    }

    /// Ask the device what it runs, if the local artifact allows it.
    ///
    /// Returns `None` whenever the answer cannot be had; the caller then
    /// flashes unconditionally.
    async fn installed_state(
        &self,
        build: &ResolvedBuild,
        device: &DeviceRecord,
    ) -> Option<DeviceState> {
        if !self
            .collaborators
            .resolver
            .artifact_exists(&build.artifact_path)
            .await
        {
            debug!(
                artifact = %build.artifact_path.display(),
                "Artifact not present locally, skipping installed build check"
            );
            return None;
        }

        let mut session = match self
            .collaborators
            .device
            .open_session(&build.artifact_path)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open device session, skipping installed build check: {}", e);
                return None;
            }
        };
        let installed = session.version_info().await;
        if let Err(e) = session.close().await {
            debug!("Closing version session failed: {}", e);
        }

        match installed {
            Ok(installed) => Some(DeviceState::new(installed, device)),
            Err(e) => {
                warn!("Could not query installed build, flashing anyway: {}", e);
                None
            }
        }
    }

    /// Run up to `max_attempts` identical attempts, stopping at the first success.
    ///
    /// Returns the last outcome and how many attempts were made.
    async fn attempt_updates(
        &self,
        build: &ResolvedBuild,
        request: &UpdateRequest,
        device: &DeviceRecord,
    ) -> Result<(AttemptOutcome, u32)> {
        let mut log = AttemptLog::create(&self.settings.log_path).map_err(FlashError::AttemptLog)?;
        let attempt_request = AttemptRequest {
            build,
            branch: request.branch(),
            image_kind: request.image_kind(),
            destination: &self.settings.download_path,
            device,
        };
        let max_attempts = request.max_attempts();

        let mut attempt = 0;
        let last = loop {
            attempt += 1;
            log.begin_attempt(attempt, max_attempts)
                .map_err(FlashError::AttemptLog)?;

            let outcome = match self
                .collaborators
                .device
                .update(attempt_request, &mut log)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(kind = e.kind(), "Update attempt {} raised an error: {}", attempt, e);
                    AttemptOutcome::failure(FailureReason::Other(e.to_string()))
                }
            };
            log.flush().map_err(FlashError::AttemptLog)?;

            if let AttemptOutcome::Failure { reason } = &outcome {
                warn!(
                    "Flash failed on attempt {} of {} with reason: {}",
                    attempt, max_attempts, reason
                );
            }
            if outcome.is_success() || attempt >= max_attempts {
                break outcome;
            }
        };

        debug!(log = %log.path().display(), attempts = attempt, "Attempt loop finished");
        Ok((last, attempt))
    }

    /// Bring the device record in line with the freshly flashed build
    async fn reconcile(
        &self,
        request: &UpdateRequest,
        device: &mut DeviceRecord,
        version: &str,
    ) -> Result<()> {
        let reconciliation_error = |source| FlashError::Reconciliation {
            version: version.to_string(),
            source,
        };

        let serial = device.serial_number().ok_or_else(|| {
            reconciliation_error(CollaboratorError::NotFound(format!(
                "serial number of device '{}'",
                device.name
            )))
        })?;
        self.collaborators
            .history
            .clear(serial)
            .map_err(|e| reconciliation_error(CollaboratorError::Io(e)))?;

        device.set(PROP_BRANCH, request.branch());
        device.set(PROP_DEVICE_BUILD, version);
        device.set(PROP_BUILD, version);

        for (key, value) in device.persistable() {
            self.collaborators
                .properties
                .write(&device.name, key, value)
                .await
                .map_err(reconciliation_error)?;
        }
        debug!("Synchronized properties of {}", device.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ResultCode;
    use crate::testing::TestRig;
    use dutflash_core::{ImageKind, PROP_OBJECT, PROP_SERIAL_NUMBER};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn device() -> DeviceRecord {
        DeviceRecord::new("dut-1")
            .with_property(PROP_SERIAL_NUMBER, "SN001")
            .with_property(PROP_BRANCH, "main")
            .with_property(PROP_OBJECT, json!({"handle": 3}))
    }

    fn request() -> dutflash_core::UpdateRequestBuilder {
        UpdateRequest::builder("latest").branch("main")
    }

    #[tokio::test]
    async fn test_forced_flash_never_queries_version() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.set_installed(ImageKind::Development, "120").await;
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().force_flash(true).build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.version_queries(), 0);
        assert_eq!(rig.device.attempts(), 1);
        assert_eq!(report.code(), ResultCode::Success);
    }

    #[tokio::test]
    async fn test_missing_artifact_skips_gate() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.resolver.set_artifact_present(false);
        rig.device.set_installed(ImageKind::Development, "120").await;
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.version_queries(), 0);
        assert_eq!(rig.device.attempts(), 1);
        assert_eq!(
            report.result,
            WorkflowResult::UpdateSucceeded {
                version: "120".into()
            }
        );
    }

    #[tokio::test]
    async fn test_already_on_build_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.set_installed(ImageKind::Development, "120").await;

        let request = request().abort_if_on_build(true).build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(report.result, WorkflowResult::AlreadyOnBuildAborted);
        assert_eq!(report.code(), ResultCode::Aborted);
        assert_eq!(report.attempts, 0);
        assert_eq!(rig.device.attempts(), 0);
        assert_eq!(rig.tracker.records(), vec!["D120", "abort"]);
        assert_eq!(rig.tracker.current().as_deref(), Some("abort"));
        assert!(report.tracking.is_abort());
        assert!(!dir.path().join("logs").join("flash.log").exists());
    }

    #[tokio::test]
    async fn test_already_on_build_reported() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.set_installed(ImageKind::Development, "120").await;

        let request = request().build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(report.result, WorkflowResult::AlreadyOnBuildReported);
        assert_eq!(report.code(), ResultCode::AlreadyOnBuild);
        assert_eq!(rig.device.attempts(), 0);
        assert_eq!(rig.device.open_sessions(), 0);
        assert_eq!(rig.tracker.current().as_deref(), Some("D120"));
        assert!(rig.properties.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_different_image_kind_flashes() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.set_installed(ImageKind::Production, "120").await;
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.version_queries(), 1);
        assert_eq!(rig.device.attempts(), 1);
        assert_eq!(report.code(), ResultCode::Success);
    }

    #[tokio::test]
    async fn test_branch_mismatch_flashes() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.set_installed(ImageKind::Development, "120").await;
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = UpdateRequest::builder("latest")
            .branch("release")
            .build()
            .unwrap();
        let mut device = device();
        rig.orchestrator(dir.path())
            .run(&request, &mut device)
            .await
            .unwrap();

        assert_eq!(rig.device.attempts(), 1);
        assert_eq!(device.branch(), Some("release"));
    }

    #[tokio::test]
    async fn test_version_query_failure_flashes_anyway() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.version_queries(), 1);
        assert_eq!(rig.device.open_sessions(), 0);
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.resolver.set_artifact_present(false);
        rig.device
            .push_outcome(AttemptOutcome::failure(FailureReason::Transfer))
            .await;
        rig.device
            .push_error(CollaboratorError::DeviceUnavailable("usb reset".into()))
            .await;
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().max_attempts(3).build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.attempts(), 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(
            report.result,
            WorkflowResult::UpdateSucceeded {
                version: "120".into()
            }
        );

        let log = std::fs::read_to_string(dir.path().join("logs").join("flash.log")).unwrap();
        assert!(log.contains("scripted update #1"));
        assert!(log.contains("scripted update #3"));
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.resolver.set_artifact_present(false);
        rig.device.push_outcome(AttemptOutcome::success("120")).await;
        rig.device
            .push_outcome(AttemptOutcome::failure(FailureReason::Transfer))
            .await;

        let request = request().max_attempts(5).build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.attempts(), 1);
        assert_eq!(report.code(), ResultCode::Success);
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_reason() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.resolver.set_artifact_present(false);
        rig.device
            .push_outcome(AttemptOutcome::failure(FailureReason::Download))
            .await;
        rig.device
            .push_outcome(AttemptOutcome::failure(FailureReason::Verification))
            .await;

        let request = request().max_attempts(2).build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(rig.device.attempts(), 2);
        assert_eq!(
            report.result,
            WorkflowResult::UpdateFailedExhausted {
                reason: FailureReason::Verification
            }
        );
        assert_eq!(report.code(), ResultCode::Failed);
        assert!(rig.history.cleared().is_empty());
        assert!(rig.properties.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_success_without_version_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device
            .push_outcome(AttemptOutcome::success_without_version())
            .await;

        let request = request().force_flash(true).build().unwrap();
        let report = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap();

        assert_eq!(report.result, WorkflowResult::UpdateSucceededButVersionUnknown);
        assert_eq!(report.code(), ResultCode::Failed);
        assert_eq!(report.message(), "Device updated but failed to get build");
        assert!(rig.properties.writes().await.is_empty());
        assert!(rig.history.cleared().is_empty());
    }

    #[tokio::test]
    async fn test_success_reconciles_properties() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("1.2.3");
        rig.device.push_outcome(AttemptOutcome::success("1.2.3")).await;

        let request = request().force_flash(true).build().unwrap();
        let mut device = device();
        rig.orchestrator(dir.path())
            .run(&request, &mut device)
            .await
            .unwrap();

        assert_eq!(rig.history.cleared(), vec!["SN001"]);
        assert_eq!(device.get_str("device_build"), Some("1.2.3"));
        assert_eq!(device.get_str("build"), Some("1.2.3"));
        assert_eq!(
            rig.properties.value("dut-1", "device_build").await,
            Some(json!("1.2.3"))
        );
        assert_eq!(
            rig.properties.value("dut-1", "build").await,
            Some(json!("1.2.3"))
        );
        assert_eq!(
            rig.properties.value("dut-1", "branch").await,
            Some(json!("main"))
        );

        let writes = rig.properties.writes().await;
        assert!(writes.iter().all(|(_, key, _)| key != PROP_OBJECT));
        assert_eq!(writes.len(), device.properties.len() - 1);
        assert!(device.properties.contains_key(PROP_OBJECT));
    }

    #[tokio::test]
    async fn test_resolution_failure_is_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.resolver.set_fail_resolution(true);

        let request = request().build().unwrap();
        let err = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap_err();

        assert!(matches!(err, FlashError::Resolution { .. }));
        assert_eq!(err.result_code(), ResultCode::Error);
        assert!(!err.device_updated());
        assert!(rig.tracker.records().is_empty());
        assert_eq!(rig.device.attempts(), 0);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_carries_version() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.properties.fail_on("build");
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().force_flash(true).build().unwrap();
        let err = rig
            .orchestrator(dir.path())
            .run(&request, &mut device())
            .await
            .unwrap_err();

        match &err {
            FlashError::Reconciliation { version, .. } => assert_eq!(version, "120"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.device_updated());
    }

    #[tokio::test]
    async fn test_missing_serial_fails_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        rig.device.push_outcome(AttemptOutcome::success("120")).await;

        let request = request().force_flash(true).build().unwrap();
        let mut device = DeviceRecord::new("dut-2");
        let err = rig
            .orchestrator(dir.path())
            .run(&request, &mut device)
            .await
            .unwrap_err();

        assert!(matches!(err, FlashError::Reconciliation { .. }));
        assert!(rig.properties.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_plan_targets_explicit_build() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new("120");
        let orchestrator = rig.orchestrator(dir.path());

        let request = UpdateRequest::builder("98").branch("main").build().unwrap();
        let build = orchestrator.plan(&request).await.unwrap();

        assert_eq!(build.build_number, "98");
        assert_eq!(
            build.artifact_path,
            dir.path().join("downloads").join("main").join("98")
        );
        assert_eq!(rig.resolver.resolutions(), 1);
    }
}
