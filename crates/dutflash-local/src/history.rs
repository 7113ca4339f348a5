//! Historic command files, one per device serial number

use std::fs::File;
use std::path::{Path, PathBuf};

use dutflash_core::CommandHistory;
use tracing::debug;

/// Directory of `<serial>.history` files
#[derive(Debug, Clone)]
pub struct HistoryDir {
    dir: PathBuf,
}

impl HistoryDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// History file for a serial number
    pub fn path_for(&self, serial_number: &str) -> PathBuf {
        self.dir.join(format!("{}.history", serial_number))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CommandHistory for HistoryDir {
    fn clear(&self, serial_number: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(serial_number);
        File::create(&path)?;
        debug!(path = %path.display(), "Cleared command history");
        Ok(())
    }
}
