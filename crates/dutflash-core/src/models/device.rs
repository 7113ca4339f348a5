//! Device records and installed-image snapshots

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::image::ImageKind;

/// Property key holding the device name
pub const PROP_NAME: &str = "name";
/// Property key holding the device serial number
pub const PROP_SERIAL_NUMBER: &str = "serialNumber";
/// Property key holding the branch the device was last flashed from
pub const PROP_BRANCH: &str = "branch";
/// Property key holding the build reported by the device
pub const PROP_DEVICE_BUILD: &str = "device_build";
/// Property key holding the build the device is considered to run
pub const PROP_BUILD: &str = "build";
/// In-memory handle reference; never persisted
pub const PROP_OBJECT: &str = "object";

/// Image kind and version reported by the device itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledImage {
    pub kind: ImageKind,
    pub version: String,
}

/// Snapshot of what a device runs, combined with its locally stored branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub installed_image_kind: ImageKind,
    pub installed_version: String,
    /// Device-local metadata, never queried from the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl DeviceState {
    pub fn new(installed: InstalledImage, record: &DeviceRecord) -> Self {
        Self {
            installed_image_kind: installed.kind,
            installed_version: installed.version,
            branch: record.branch().map(String::from),
            serial_number: record.serial_number().map(String::from),
        }
    }

    /// Whether the device already runs exactly this build, kind and branch
    pub fn matches(&self, build_number: &str, kind: ImageKind, branch: &str) -> bool {
        self.installed_version == build_number
            && self.installed_image_kind == kind
            && self.branch.as_deref() == Some(branch)
    }
}

/// Named property bag describing one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut properties = BTreeMap::new();
        properties.insert(PROP_NAME.to_string(), Value::String(name.clone()));
        Self { name, properties }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.get_str(PROP_SERIAL_NUMBER)
    }

    pub fn branch(&self) -> Option<&str> {
        self.get_str(PROP_BRANCH)
    }

    /// Properties that may be written to a property store
    pub fn persistable(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties
            .iter()
            .filter(|(key, _)| key.as_str() != PROP_OBJECT)
            .map(|(key, value)| (key.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_persistable_skips_object() {
        let record = DeviceRecord::new("dut-1")
            .with_property(PROP_OBJECT, json!({"handle": 7}))
            .with_property(PROP_SERIAL_NUMBER, "SN123");

        let keys: Vec<_> = record.persistable().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "serialNumber"]);
    }

    #[test]
    fn test_state_matches() {
        let record = DeviceRecord::new("dut-1").with_property(PROP_BRANCH, "main");
        let state = DeviceState::new(
            InstalledImage {
                kind: ImageKind::Development,
                version: "120".into(),
            },
            &record,
        );

        assert!(state.matches("120", ImageKind::Development, "main"));
        assert!(!state.matches("121", ImageKind::Development, "main"));
        assert!(!state.matches("120", ImageKind::Production, "main"));
        assert!(!state.matches("120", ImageKind::Development, "release"));
    }

    #[test]
    fn test_state_without_branch_never_matches() {
        let record = DeviceRecord::new("dut-1");
        let state = DeviceState::new(
            InstalledImage {
                kind: ImageKind::Development,
                version: "120".into(),
            },
            &record,
        );
        assert!(!state.matches("120", ImageKind::Development, "main"));
    }
}
