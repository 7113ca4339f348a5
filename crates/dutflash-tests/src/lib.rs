//! Shared fixtures for dutflash integration tests
//!
//! A [`Workspace`] lays out a throwaway build store, download area, property
//! store, history directory and tracking file in a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dutflash_core::{DeviceHandle, DeviceRecord, PropertySink, PROP_BRANCH, PROP_SERIAL_NUMBER};
use dutflash_engine::{Collaborators, FlashOrchestrator, OrchestratorSettings};
use dutflash_local::{FileTracker, HistoryDir, JsonPropertyStore, LocalBuildResolver};
use tempfile::TempDir;

pub struct Workspace {
    dir: TempDir,
    pub properties: Arc<JsonPropertyStore>,
    pub history: Arc<HistoryDir>,
    pub tracker: Arc<FileTracker>,
}

impl Workspace {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let properties = Arc::new(JsonPropertyStore::new(dir.path().join("devices")));
        let history = Arc::new(HistoryDir::new(dir.path().join("history")));
        let tracker = Arc::new(FileTracker::new(dir.path().join("build_info")));
        Ok(Self {
            dir,
            properties,
            history,
            tracker,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn build_store(&self) -> PathBuf {
        self.path().join("builds")
    }

    pub fn downloads(&self) -> PathBuf {
        self.path().join("downloads")
    }

    pub fn log_file(&self) -> PathBuf {
        self.path()
            .join("logs")
            .join(OrchestratorSettings::LOG_FILE_NAME)
    }

    /// Publish builds on a branch of the build store
    pub fn publish(&self, branch: &str, builds: &[&str]) -> std::io::Result<()> {
        for build in builds {
            std::fs::create_dir_all(self.build_store().join(branch).join(build))?;
        }
        Ok(())
    }

    /// Place a build's device tool in the download area
    pub fn download(&self, branch: &str, build: &str) -> std::io::Result<PathBuf> {
        let tool = self
            .downloads()
            .join(branch)
            .join(build)
            .join(dutflash_local::DEFAULT_TOOL_PATH);
        if let Some(parent) = tool.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tool, "")?;
        Ok(tool)
    }

    /// Register a device in the property store and return its record
    pub async fn register_device(
        &self,
        name: &str,
        serial: &str,
        branch: &str,
    ) -> Result<DeviceRecord, dutflash_core::CollaboratorError> {
        let record = DeviceRecord::new(name)
            .with_property(PROP_SERIAL_NUMBER, serial)
            .with_property(PROP_BRANCH, branch);
        for (key, value) in record.persistable() {
            self.properties.write(name, key, value).await?;
        }
        Ok(record)
    }

    pub fn tracking_content(&self) -> Option<String> {
        std::fs::read_to_string(self.tracker.path()).ok()
    }

    pub fn orchestrator(&self, device: Arc<dyn DeviceHandle>) -> FlashOrchestrator {
        FlashOrchestrator::new(
            Collaborators {
                resolver: Arc::new(LocalBuildResolver::new(self.build_store())),
                device,
                properties: self.properties.clone(),
                tracker: self.tracker.clone(),
                history: self.history.clone(),
            },
            OrchestratorSettings::new(self.downloads(), self.path().join("logs")),
        )
    }
}
