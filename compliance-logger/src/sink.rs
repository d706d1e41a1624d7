//! Append-only category files.
//!
//! Writes are synchronous and happen on the caller's thread. Each append
//! opens the active file, writes one line and closes it again, so a file
//! renamed by rotation is never held open by the writer. A write that races
//! with a rotation rename can still land in the just-rotated file; callers that
//! need a hard guarantee must serialize rotation against writers.

use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::config::LogLayout;
use crate::error::{LoggerError, LoggerResult};
use crate::record::LogCategory;

/// One in-process lock per category file
#[derive(Debug, Default)]
pub struct CategorySinks {
    standard: Mutex<()>,
    personal: Mutex<()>,
    sensitive: Mutex<()>,
}

impl CategorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, category: LogCategory) -> &Mutex<()> {
        match category {
            LogCategory::Standard => &self.standard,
            LogCategory::Personal => &self.personal,
            LogCategory::Sensitive => &self.sensitive,
        }
    }

    /// Append a serialized record to the category's active file, creating the
    /// directory and the file on first use.
    pub fn append(
        &self,
        layout: &LogLayout,
        category: LogCategory,
        record: &serde_json::Map<String, serde_json::Value>,
    ) -> LoggerResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock_for(category).lock();
        let dir = layout.dir_for(category);
        fs::create_dir_all(dir).map_err(|e| write_error(category, e))?;

        let mut file = open_append(&layout.active_file(category), category.file_mode())
            .map_err(|e| write_error(category, e))?;
        file.write_all(&line).map_err(|e| write_error(category, e))?;

        Ok(())
    }
}

#[cfg(unix)]
fn open_append(path: &Path, mode: u32) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().create(true).append(true).mode(mode).open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path, _mode: u32) -> std::io::Result<fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn write_error(category: LogCategory, e: std::io::Error) -> LoggerError {
    LoggerError::Write {
        category: category.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_creates_file_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let layout = LogLayout::under(temp_dir.path());
        let sinks = CategorySinks::new();

        assert!(!layout.active_file(LogCategory::Personal).exists());

        let mut record = serde_json::Map::new();
        record.insert("message".into(), serde_json::json!("first"));
        sinks.append(&layout, LogCategory::Personal, &record).unwrap();
        record.insert("message".into(), serde_json::json!("second"));
        sinks.append(&layout, LogCategory::Personal, &record).unwrap();

        let content = fs::read_to_string(layout.active_file(LogCategory::Personal)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"message":"first"}"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_modes_per_category() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let layout = LogLayout::under(temp_dir.path());
        let sinks = CategorySinks::new();
        let record = serde_json::Map::new();

        for category in LogCategory::ALL {
            sinks.append(&layout, category, &record).unwrap();
        }

        let mode = |c: LogCategory| {
            fs::metadata(layout.active_file(c)).unwrap().permissions().mode() & 0o777
        };
        // The process umask may only remove bits, never add them
        assert_eq!(mode(LogCategory::Sensitive) & 0o077, 0);
        assert_eq!(mode(LogCategory::Personal) & 0o077, 0);
        assert_eq!(mode(LogCategory::Standard) & 0o600, 0o600);
    }
}
