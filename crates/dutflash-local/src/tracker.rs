//! Tracking handoff file

use std::path::{Path, PathBuf};

use dutflash_core::BuildTracker;
use tracing::debug;

use crate::fs::write_atomic;

/// Plain-text file holding the latest tracking record
#[derive(Debug, Clone)]
pub struct FileTracker {
    path: PathBuf,
}

impl FileTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BuildTracker for FileTracker {
    fn record(&self, content: &str) -> std::io::Result<()> {
        debug!(path = %self.path.display(), content, "Recording tracking state");
        write_atomic(&self.path, content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(dir.path().join("build_info"));

        tracker.record("D120").unwrap();
        let first = std::fs::read(tracker.path()).unwrap();
        tracker.record("D120").unwrap();
        let second = std::fs::read(tracker.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, b"D120");
    }

    #[test]
    fn test_abort_overwrites_target() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(dir.path().join("build_info"));

        tracker.record("D120").unwrap();
        tracker.record("abort").unwrap();

        assert_eq!(std::fs::read_to_string(tracker.path()).unwrap(), "abort");
    }
}
