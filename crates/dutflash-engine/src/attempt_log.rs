//! Append-accumulating log shared by every attempt of a run

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

/// Log file receiving the output of all update attempts.
///
/// Created (truncated) once per run; attempts append to it in order. The
/// file is flushed and closed when the log is dropped.
pub struct AttemptLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AttemptLog {
    /// Create or truncate the log at `path`, creating parent directories
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a header separating one attempt's output from the next
    pub fn begin_attempt(&mut self, attempt: u32, max_attempts: u32) -> io::Result<()> {
        writeln!(
            self.writer,
            "=== attempt {}/{} ({}) ===",
            attempt,
            max_attempts,
            Utc::now().to_rfc3339()
        )?;
        self.writer.flush()
    }
}

impl Write for AttemptLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
