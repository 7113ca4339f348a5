//! Test utilities for dutflash-engine
//!
//! In-memory collaborators with call counters, for driving the orchestrator
//! without hardware:
//!
//! ```ignore
//! use dutflash_engine::testing::TestRig;
//!
//! let rig = TestRig::new("120");
//! rig.device.push_outcome(AttemptOutcome::success("120")).await;
//! let report = rig.orchestrator(dir.path()).run(&request, &mut device).await?;
//! assert_eq!(rig.device.attempts(), 1);
//! ```

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dutflash_core::{
    AttemptOutcome, AttemptRequest, BuildInfo, BuildResolver, BuildTracker, CollaboratorError,
    CollaboratorResult, CommandHistory, DeviceHandle, FailureReason, ImageKind, InstalledImage,
    PropertySink, VersionSession,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::orchestrator::{Collaborators, FlashOrchestrator, OrchestratorSettings};

/// Resolver that maps "latest" to a fixed build and echoes explicit tokens
pub struct FakeResolver {
    latest: String,
    artifact_present: AtomicBool,
    fail_resolution: AtomicBool,
    resolutions: AtomicUsize,
}

impl FakeResolver {
    pub fn new(latest: impl Into<String>) -> Self {
        Self {
            latest: latest.into(),
            artifact_present: AtomicBool::new(true),
            fail_resolution: AtomicBool::new(false),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn set_artifact_present(&self, present: bool) {
        self.artifact_present.store(present, Ordering::SeqCst);
    }

    pub fn set_fail_resolution(&self, fail: bool) {
        self.fail_resolution.store(fail, Ordering::SeqCst);
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildResolver for FakeResolver {
    async fn resolve(&self, token: &str, branch: &str) -> CollaboratorResult<BuildInfo> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolution.load(Ordering::SeqCst) {
            return Err(CollaboratorError::NotFound(format!(
                "no build '{}' on branch '{}'",
                token, branch
            )));
        }
        let number = if token == dutflash_core::LATEST_BUILD {
            self.latest.clone()
        } else {
            token.to_string()
        };
        Ok(BuildInfo::new(number))
    }

    async fn locate_artifact(
        &self,
        branch: &str,
        build_number: &str,
        download_path: &Path,
    ) -> CollaboratorResult<PathBuf> {
        Ok(download_path.join(branch).join(build_number))
    }

    async fn artifact_exists(&self, _artifact: &Path) -> bool {
        self.artifact_present.load(Ordering::SeqCst)
    }
}

/// Device whose installed image and attempt outcomes are scripted
pub struct ScriptedDevice {
    installed: Mutex<Option<InstalledImage>>,
    outcomes: Mutex<VecDeque<CollaboratorResult<AttemptOutcome>>>,
    version_queries: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
    attempts: AtomicUsize,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(None),
            outcomes: Mutex::new(VecDeque::new()),
            version_queries: Arc::new(AtomicUsize::new(0)),
            open_sessions: Arc::new(AtomicUsize::new(0)),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Set what the device reports as installed; `None` makes queries fail
    pub async fn set_installed(&self, kind: ImageKind, version: impl Into<String>) {
        *self.installed.lock().await = Some(InstalledImage {
            kind,
            version: version.into(),
        });
    }

    /// Queue the outcome of the next update attempt
    pub async fn push_outcome(&self, outcome: AttemptOutcome) {
        self.outcomes.lock().await.push_back(Ok(outcome));
    }

    /// Queue a collaborator error for the next update attempt
    pub async fn push_error(&self, error: CollaboratorError) {
        self.outcomes.lock().await.push_back(Err(error));
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn version_queries(&self) -> usize {
        self.version_queries.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet released
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

struct ScriptedSession {
    installed: Option<InstalledImage>,
    version_queries: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

#[async_trait]
impl VersionSession for ScriptedSession {
    async fn version_info(&mut self) -> CollaboratorResult<InstalledImage> {
        self.version_queries.fetch_add(1, Ordering::SeqCst);
        self.installed
            .clone()
            .ok_or_else(|| CollaboratorError::DeviceUnavailable("no version scripted".into()))
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceHandle for ScriptedDevice {
    async fn open_session(&self, _artifact: &Path) -> CollaboratorResult<Box<dyn VersionSession>> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            installed: self.installed.lock().await.clone(),
            version_queries: self.version_queries.clone(),
            open_sessions: self.open_sessions.clone(),
        }))
    }

    async fn update(
        &self,
        request: AttemptRequest<'_>,
        log: &mut (dyn Write + Send),
    ) -> CollaboratorResult<AttemptOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        writeln!(
            log,
            "scripted update #{} to {} ({})",
            attempt, request.build.build_number, request.image_kind
        )?;
        self.outcomes.lock().await.pop_front().unwrap_or_else(|| {
            Ok(AttemptOutcome::failure(FailureReason::Other(
                "no scripted outcome".into(),
            )))
        })
    }
}

/// Property sink that records every write
#[derive(Default)]
pub struct MemoryPropertySink {
    writes: Mutex<Vec<(String, String, Value)>>,
    fail_key: std::sync::Mutex<Option<String>>,
}

impl MemoryPropertySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes of `key` fail
    pub fn fail_on(&self, key: impl Into<String>) {
        if let Ok(mut fail_key) = self.fail_key.lock() {
            *fail_key = Some(key.into());
        }
    }

    /// All writes so far as (device, key, value)
    pub async fn writes(&self) -> Vec<(String, String, Value)> {
        self.writes.lock().await.clone()
    }

    /// Last value written for a device/key pair
    pub async fn value(&self, device: &str, key: &str) -> Option<Value> {
        self.writes
            .lock()
            .await
            .iter()
            .rev()
            .find(|(d, k, _)| d == device && k == key)
            .map(|(_, _, v)| v.clone())
    }
}

#[async_trait]
impl PropertySink for MemoryPropertySink {
    async fn write(&self, device: &str, key: &str, value: &Value) -> CollaboratorResult<()> {
        let failing = self
            .fail_key
            .lock()
            .map(|k| k.as_deref() == Some(key))
            .unwrap_or(false);
        if failing {
            return Err(CollaboratorError::Internal(format!(
                "write of '{}' rejected",
                key
            )));
        }
        self.writes
            .lock()
            .await
            .push((device.to_string(), key.to_string(), value.clone()));
        Ok(())
    }
}

/// Tracker keeping every recorded content in order
#[derive(Default)]
pub struct MemoryTracker {
    records: std::sync::Mutex<Vec<String>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Most recent content, as an external consumer would see it
    pub fn current(&self) -> Option<String> {
        self.records().last().cloned()
    }
}

impl BuildTracker for MemoryTracker {
    fn record(&self, content: &str) -> std::io::Result<()> {
        self.records
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "poisoned"))?
            .push(content.to_string());
        Ok(())
    }
}

/// Command history recording which serials were cleared
#[derive(Default)]
pub struct MemoryHistory {
    cleared: std::sync::Mutex<Vec<String>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandHistory for MemoryHistory {
    fn clear(&self, serial_number: &str) -> std::io::Result<()> {
        self.cleared
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "poisoned"))?
            .push(serial_number.to_string());
        Ok(())
    }
}

/// A full set of in-memory collaborators
pub struct TestRig {
    pub resolver: Arc<FakeResolver>,
    pub device: Arc<ScriptedDevice>,
    pub properties: Arc<MemoryPropertySink>,
    pub tracker: Arc<MemoryTracker>,
    pub history: Arc<MemoryHistory>,
}

impl TestRig {
    /// Rig whose resolver maps "latest" to `latest_build`
    pub fn new(latest_build: &str) -> Self {
        Self {
            resolver: Arc::new(FakeResolver::new(latest_build)),
            device: Arc::new(ScriptedDevice::new()),
            properties: Arc::new(MemoryPropertySink::new()),
            tracker: Arc::new(MemoryTracker::new()),
            history: Arc::new(MemoryHistory::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: self.resolver.clone(),
            device: self.device.clone(),
            properties: self.properties.clone(),
            tracker: self.tracker.clone(),
            history: self.history.clone(),
        }
    }

    /// Orchestrator downloading to and logging under `work_dir`
    pub fn orchestrator(&self, work_dir: &Path) -> FlashOrchestrator {
        FlashOrchestrator::new(
            self.collaborators(),
            OrchestratorSettings::new(work_dir.join("downloads"), work_dir.join("logs")),
        )
    }
}
