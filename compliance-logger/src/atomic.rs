//! Scoped atomic file replacement.
//!
//! Content is written to a temporary file in the target's directory and
//! renamed over the target on [`AtomicReplace::commit`]. Dropping the value
//! without committing removes the temporary file and leaves the target as it
//! was.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{LoggerError, LoggerResult};

pub struct AtomicReplace {
    target: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl AtomicReplace {
    pub fn new(target: impl AsRef<Path>) -> LoggerResult<Self> {
        let target = target.as_ref().to_path_buf();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = NamedTempFile::new_in(&dir).map_err(|e| replace_error(&target, e))?;
        Ok(Self {
            target,
            writer: BufWriter::new(temp),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush, sync and rename over the target, keeping the target's
    /// permission bits when it exists.
    pub fn commit(self) -> LoggerResult<()> {
        let target = self.target;
        let temp = self
            .writer
            .into_inner()
            .map_err(|e| replace_error(&target, e.into_error()))?;

        temp.as_file()
            .sync_all()
            .map_err(|e| replace_error(&target, e))?;

        if let Ok(metadata) = fs::metadata(&target) {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|e| replace_error(&target, e))?;
        }

        temp.persist(&target)
            .map_err(|e| replace_error(&target, e.error))?;
        Ok(())
    }
}

impl Write for AtomicReplace {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn replace_error(path: &Path, e: io::Error) -> LoggerError {
    LoggerError::AtomicReplace {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
