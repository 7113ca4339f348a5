//! JSON-file property store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dutflash_core::{CollaboratorError, CollaboratorResult, DeviceRecord, PropertySink};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::fs::write_atomic;

/// Stores each device's properties as `<dir>/<device>.json`
pub struct JsonPropertyStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonPropertyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, device: &str) -> CollaboratorResult<PathBuf> {
        if device.is_empty() || device.contains(['/', '\\']) || device.starts_with('.') {
            return Err(CollaboratorError::Internal(format!(
                "invalid device name: '{}'",
                device
            )));
        }
        Ok(self.dir.join(format!("{}.json", device)))
    }

    async fn read_map(&self, path: &Path) -> CollaboratorResult<Option<BTreeMap<String, Value>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a device's record
    pub async fn load(&self, device: &str) -> CollaboratorResult<DeviceRecord> {
        let path = self.path_for(device)?;
        let properties = self
            .read_map(&path)
            .await?
            .ok_or_else(|| CollaboratorError::NotFound(format!("device '{}'", device)))?;
        Ok(DeviceRecord {
            name: device.to_string(),
            properties,
        })
    }
}

#[async_trait]
impl PropertySink for JsonPropertyStore {
    async fn write(&self, device: &str, key: &str, value: &Value) -> CollaboratorResult<()> {
        let path = self.path_for(device)?;
        let _guard = self.write_lock.lock().await;

        let mut properties = self.read_map(&path).await?.unwrap_or_default();
        if properties.get(key) == Some(value) {
            return Ok(());
        }
        properties.insert(key.to_string(), value.clone());

        let json = serde_json::to_vec_pretty(&properties)?;
        write_atomic(&path, &json)?;
        debug!(device, key, "Stored property");
        Ok(())
    }
}
