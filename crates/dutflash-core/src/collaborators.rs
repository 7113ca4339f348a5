//! Traits for everything the flash orchestrator talks to
//!
//! The orchestrator never touches the device, the build store or the
//! property database directly. Each is reached through one of these traits,
//! so the same workflow can drive real hardware, a local tool chain or the
//! in-memory fakes used in tests.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CollaboratorResult;
use crate::models::{
    AttemptOutcome, BuildInfo, DeviceRecord, ImageKind, InstalledImage, ResolvedBuild,
};

/// Maps build tokens to concrete builds and locates their artifacts
#[async_trait]
pub trait BuildResolver: Send + Sync {
    /// Resolve a token ("latest", an explicit number, ...) on a branch.
    ///
    /// Deterministic at call time; "latest" may resolve differently later.
    async fn resolve(&self, token: &str, branch: &str) -> CollaboratorResult<BuildInfo>;

    /// Local path where the artifact for a build is (or would be) found
    async fn locate_artifact(
        &self,
        branch: &str,
        build_number: &str,
        download_path: &Path,
    ) -> CollaboratorResult<std::path::PathBuf>;

    /// Whether the located artifact actually exists
    async fn artifact_exists(&self, artifact: &Path) -> bool;
}

/// Short-lived connection used to ask a device what it runs.
///
/// Opened with [`DeviceHandle::open_session`] and released by
/// [`VersionSession::close`], or on drop.
#[async_trait]
pub trait VersionSession: Send {
    /// Installed image kind and version
    async fn version_info(&mut self) -> CollaboratorResult<InstalledImage>;

    /// Release the session
    async fn close(self: Box<Self>) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Parameters for one update attempt
#[derive(Debug, Clone, Copy)]
pub struct AttemptRequest<'a> {
    pub build: &'a ResolvedBuild,
    pub branch: &'a str,
    pub image_kind: ImageKind,
    /// Where the update mechanism may download/stage the image
    pub destination: &'a Path,
    pub device: &'a DeviceRecord,
}

/// Connection to one physical device under test
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Open a version-query session using the tooling shipped with `artifact`
    async fn open_session(&self, artifact: &Path) -> CollaboratorResult<Box<dyn VersionSession>>;

    /// Perform one update attempt, writing tool output to `log`
    async fn update(
        &self,
        request: AttemptRequest<'_>,
        log: &mut (dyn Write + Send),
    ) -> CollaboratorResult<AttemptOutcome>;
}

/// Durable key/value record per device
#[async_trait]
pub trait PropertySink: Send + Sync {
    /// Idempotent single-field upsert
    async fn write(&self, device: &str, key: &str, value: &Value) -> CollaboratorResult<()>;
}

/// Handoff signal telling external tooling which build a device is pointed at
pub trait BuildTracker: Send + Sync {
    /// Replace the tracked content
    fn record(&self, content: &str) -> std::io::Result<()>;
}

/// Per-serial-number record of commands previously sent to a device
pub trait CommandHistory: Send + Sync {
    /// Truncate the history for `serial_number` to empty
    fn clear(&self, serial_number: &str) -> std::io::Result<()>;
}
