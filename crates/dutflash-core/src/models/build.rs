//! Resolved builds

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a build resolver reports for a token/branch pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Canonical build number
    pub build_number: String,
    /// Resolver-specific extras (source location, timestamps, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl BuildInfo {
    pub fn new(build_number: impl Into<String>) -> Self {
        Self {
            build_number: build_number.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The single build every attempt of a run targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBuild {
    /// Canonical build number
    pub build_number: String,
    /// Where the build's artifact lives (or would live) locally
    pub artifact_path: PathBuf,
}
