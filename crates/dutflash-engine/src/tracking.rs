//! Tracking record: which build a device is currently pointed at

use dutflash_core::ImageKind;
use serde::{Deserialize, Serialize};

/// Content of the tracking handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TrackingRecord {
    /// Run targets this image tag and build number
    Target { tag: String, build_number: String },
    /// Run aborted because the device was already on build
    Abort,
}

impl TrackingRecord {
    /// Literal written when a run aborts on an up-to-date device
    pub const ABORT_MARKER: &'static str = "abort";

    pub fn target(kind: ImageKind, build_number: &str) -> Self {
        TrackingRecord::Target {
            tag: kind.tag().to_string(),
            build_number: build_number.to_string(),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, TrackingRecord::Abort)
    }
}

impl std::fmt::Display for TrackingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingRecord::Target { tag, build_number } => write!(f, "{}{}", tag, build_number),
            TrackingRecord::Abort => f.write_str(Self::ABORT_MARKER),
        }
    }
}
