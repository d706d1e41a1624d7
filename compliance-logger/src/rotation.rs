//! Retention-driven rotation of the category directories.
//!
//! One pass walks every category directory. Files older than the category's
//! retention are handled by kind: the active `<category>.log` is renamed to a
//! timestamped file and recreated empty with the same permission bits, while
//! already rotated files are deleted. Per-file failures are logged and skipped.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{LogLayout, LoggerConfig, RetentionConfig};
use crate::error::{LoggerError, LoggerResult};
use crate::record::LogCategory;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of a rotation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub skipped_empty: usize,
    pub errors: usize,
}

impl RotationReport {
    fn merge(&mut self, other: RotationReport) {
        self.rotated.extend(other.rotated);
        self.deleted.extend(other.deleted);
        self.skipped_empty += other.skipped_empty;
        self.errors += other.errors;
    }

    fn log_summary(&self) {
        tracing::info!(
            rotated = self.rotated.len(),
            deleted = self.deleted.len(),
            skipped_empty = self.skipped_empty,
            errors = self.errors,
            "Log rotation pass complete"
        );
    }
}

/// Run one rotation pass over all category directories
pub async fn run_rotation_pass(layout: &LogLayout, retention: &RetentionConfig) -> RotationReport {
    let mut report = RotationReport::default();
    for category in LogCategory::ALL {
        let dir_report = rotate_directory(
            category,
            layout.dir_for(category),
            retention.days_for(category),
        )
        .await;
        report.merge(dir_report);
    }
    report
}

/// Apply retention to a single category directory. A missing directory is
/// not an error.
pub async fn rotate_directory(
    category: LogCategory,
    dir: &Path,
    retention_days: u32,
) -> RotationReport {
    let mut report = RotationReport::default();

    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(category = %category, dir = %dir.display(), "Log directory absent, nothing to rotate");
            return report;
        }
        Err(e) => {
            tracing::warn!(category = %category, dir = %dir.display(), error = %e, "Failed to read log directory");
            report.errors += 1;
            return report;
        }
    };

    // Snapshot first so files renamed during this pass are not revisited
    let mut entries = Vec::new();
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to list log directory");
                report.errors += 1;
                break;
            }
        }
    }

    let max_age = Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY);
    let now = SystemTime::now();
    let active_name = category.active_file_name();

    for entry in entries {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to stat log file");
                report.errors += 1;
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to read modification time");
                report.errors += 1;
                continue;
            }
        };

        // A modification time in the future counts as age zero
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();

        if file_name == active_name {
            if metadata.len() == 0 {
                report.skipped_empty += 1;
                continue;
            }
            match rotate_active_file(category, dir, &path, metadata.permissions()).await {
                Ok(rotated) => {
                    tracing::info!(category = %category, rotated = %rotated.display(), "Rotated active log file");
                    report.rotated.push(rotated);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to rotate log file");
                    report.errors += 1;
                }
            }
        } else if is_rotated_file_name(category, &file_name) {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(category = %category, file = %path.display(), "Deleted expired log file");
                    report.deleted.push(path);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to delete expired log file");
                    report.errors += 1;
                }
            }
        } else {
            tracing::debug!(file = %path.display(), "Ignoring foreign file in log directory");
        }
    }

    report
}

async fn rotate_active_file(
    category: LogCategory,
    dir: &Path,
    active: &Path,
    permissions: std::fs::Permissions,
) -> std::io::Result<PathBuf> {
    let rotated = dir.join(category.rotated_file_name(Utc::now()));
    fs::rename(active, &rotated).await?;
    recreate_active(active, permissions).await?;
    Ok(rotated)
}

/// Create `active` if missing. A writer may already have recreated it after
/// the rename, so existing content is never truncated.
async fn recreate_active(active: &Path, permissions: std::fs::Permissions) -> std::io::Result<()> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(active)
        .await?;
    fs::set_permissions(active, permissions).await
}

/// `<category>.<YYYYMMDD-HHMMSS>.log`
pub fn is_rotated_file_name(category: LogCategory, file_name: &str) -> bool {
    let Some(stamp) = file_name
        .strip_prefix(category.as_str())
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".log"))
    else {
        return false;
    };

    let bytes = stamp.as_bytes();
    bytes.len() == 15
        && bytes.iter().enumerate().all(|(i, b)| {
            if i == 8 {
                *b == b'-'
            } else {
                b.is_ascii_digit()
            }
        })
}

/// Render a logrotate stanza per category directory
pub fn render_logrotate_config(layout: &LogLayout, retention: &RetentionConfig) -> String {
    let mut out = String::from("# Managed by compliance-logger\n");
    for category in LogCategory::ALL {
        let days = retention.days_for(category);
        out.push_str(&format!(
            "{dir}/{name} {{\n    daily\n    rotate {days}\n    maxage {days}\n    missingok\n    notifempty\n    copytruncate\n    dateext\n    dateformat .%Y%m%d-%H%M%S\n}}\n",
            dir = layout.dir_for(category).display(),
            name = category.active_file_name(),
            days = days,
        ));
    }
    out
}

/// Best effort: failures only show up at debug level
pub(crate) fn emit_os_rotation_config(config: &LoggerConfig) {
    let Some(path) = config.logrotate_config_path.as_ref() else {
        return;
    };

    #[cfg(target_os = "linux")]
    {
        let rendered = render_logrotate_config(&config.layout, &config.retention);
        if let Err(e) = std::fs::write(path, rendered) {
            tracing::debug!(path = %path.display(), error = %e, "Skipping OS rotation config");
        }
    }

    #[cfg(not(target_os = "linux"))]
    tracing::debug!(path = %path.display(), "OS rotation config not supported on this platform");
}

struct RotationTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the background rotation task for one logger instance
pub struct RotationManager {
    config: Arc<RwLock<LoggerConfig>>,
    task: Mutex<Option<RotationTask>>,
}

impl RotationManager {
    pub fn new(config: Arc<RwLock<LoggerConfig>>) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> (LogLayout, RetentionConfig) {
        let config = self.config.read();
        (config.layout.clone(), config.retention)
    }

    /// Run one pass immediately with the current configuration
    pub async fn rotate_now(&self) -> RotationReport {
        let (layout, retention) = self.snapshot();
        let report = run_rotation_pass(&layout, &retention).await;
        report.log_summary();
        report
    }

    pub fn retention_config(&self) -> RetentionConfig {
        self.config.read().retention
    }

    /// Replace the retention periods and apply them right away
    pub async fn update_retention_config(&self, retention: RetentionConfig) -> RotationReport {
        let snapshot = {
            let mut config = self.config.write();
            config.retention = retention;
            config.clone()
        };
        tracing::info!(
            standard_days = retention.standard_days,
            personal_days = retention.personal_days,
            sensitive_days = retention.sensitive_days,
            "Retention configuration updated"
        );
        emit_os_rotation_config(&snapshot);
        self.rotate_now().await
    }

    /// Spawn the scheduler: one pass now, then one per rotation interval.
    /// Starting an already running manager is a no-op.
    pub fn start(&self) -> LoggerResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LoggerError::Task(format!("Rotation requires a Tokio runtime: {}", e)))?;

        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let snapshot = self.config.read().clone();
        emit_os_rotation_config(&snapshot);

        let config = Arc::clone(&self.config);
        let interval = Duration::from_secs(snapshot.rotation_interval_secs.max(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "Log rotation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (layout, retention) = {
                            let config = config.read();
                            (config.layout.clone(), config.retention)
                        };
                        run_rotation_pass(&layout, &retention).await.log_summary();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Log rotation scheduler stopped");
        });

        *task = Some(RotationTask {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Signal the scheduler to stop and wait for it to exit
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "Rotation task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for RotationManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            let _ = task.shutdown.send(true);
        }
    }
}
