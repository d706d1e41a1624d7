use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::matcher::SubjectMatcher;
use super::{LogEntry, SearchOptions, SubjectDataResult, SubjectIdentifiers};
use crate::config::LogLayout;
use crate::error::{LoggerError, LoggerResult};
use crate::record::{LogCategory, LEVEL_KEY, MESSAGE_KEY, TIME_KEY};

pub(crate) async fn find(
    layout: &LogLayout,
    ids: &SubjectIdentifiers,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    options: &SearchOptions,
) -> LoggerResult<SubjectDataResult> {
    let mut result = SubjectDataResult {
        search_time: Utc::now(),
        subject: ids.display_name(),
        total_entries: 0,
        entries: Vec::new(),
        searched_files: Vec::new(),
        from_date: from,
        to_date: to,
    };

    if ids.is_empty() {
        tracing::debug!("Subject search with no identifiers, returning nothing");
        return Ok(result);
    }

    let matcher = SubjectMatcher::new(ids);
    let from_time = SystemTime::from(from);

    'categories: for category in LogCategory::SEARCH_ORDER {
        for path in log_files(layout.dir_for(category)).await {
            if options.is_cancelled() {
                let collected = result.entries.len();
                tracing::info!(collected, "Subject search cancelled");
                if options.strict_cancel {
                    return Err(LoggerError::Cancelled { collected });
                }
                break 'categories;
            }

            match fs::metadata(&path).await {
                Ok(metadata) => {
                    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    if modified < from_time {
                        continue;
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to stat log file");
                    continue;
                }
            }

            result.searched_files.push(path.display().to_string());
            scan_file(&path, category, &matcher, &mut result.entries).await;
        }
    }

    result
        .entries
        .retain(|entry| entry.timestamp >= from && entry.timestamp <= to);
    result.total_entries = result.entries.len();

    tracing::info!(
        subject = %result.subject,
        files = result.searched_files.len(),
        entries = result.total_entries,
        "Subject search complete"
    );

    Ok(result)
}

/// Regular `.log` files directly inside `dir`, sorted by name. A missing or
/// unreadable directory yields nothing.
pub(crate) async fn log_files(dir: &Path) -> Vec<PathBuf> {
    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to read log directory");
            }
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    loop {
        let entry = match reader.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to list log directory");
                break;
            }
        };

        let is_file = match entry.file_type().await {
            Ok(file_type) => file_type.is_file(),
            Err(_) => false,
        };
        let path = entry.path();
        if is_file && path.extension().map(|ext| ext == "log").unwrap_or(false) {
            files.push(path);
        }
    }

    files.sort();
    files
}

async fn scan_file(
    path: &Path,
    category: LogCategory,
    matcher: &SubjectMatcher<'_>,
    entries: &mut Vec<LogEntry>,
) {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Failed to open log file");
            return;
        }
    };

    let mut lines = BufReader::new(file).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Stopped reading log file");
                break;
            }
        };

        if !matcher.prefilter(&line) {
            continue;
        }

        let Ok(Value::Object(record)) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        if matcher.matches_record(&record) {
            entries.push(parse_entry(record, category, line));
        }
    }
}

/// Missing or malformed `time` falls back to now; missing `level` and
/// `message` become empty strings.
pub(crate) fn parse_entry(
    mut record: serde_json::Map<String, Value>,
    source: LogCategory,
    raw: String,
) -> LogEntry {
    let timestamp = record
        .remove(TIME_KEY)
        .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let level = match record.remove(LEVEL_KEY) {
        Some(Value::String(level)) => level,
        _ => String::new(),
    };
    let message = match record.remove(MESSAGE_KEY) {
        Some(Value::String(message)) => message,
        _ => String::new(),
    };

    LogEntry {
        timestamp,
        level,
        message,
        fields: record,
        source,
        raw,
    }
}
