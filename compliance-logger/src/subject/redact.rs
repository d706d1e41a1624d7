use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::ops::Range;
use std::path::Path;

use super::matcher::{SubjectMatcher, NESTED_FIELDS_KEY};
use super::search::{find, log_files};
use super::{unbounded_window, SearchOptions, SubjectIdentifiers};
use crate::atomic::AtomicReplace;
use crate::config::LogLayout;
use crate::error::LoggerResult;
use crate::record::LogCategory;

/// Replacement for erased identifying values
pub const ERASED_MARKER: &str = "[ERASED]";

/// Keys whose values are erased when they match the subject
pub const REDACTABLE_KEYS: &[&str] = &[
    "user_id",
    "username",
    "email",
    "name",
    "address",
    "phone",
    "ip",
    "remote_addr",
];

pub(crate) async fn erase(layout: &LogLayout, ids: &SubjectIdentifiers) -> LoggerResult<usize> {
    let (from, to) = unbounded_window();
    let found = find(layout, ids, from, to, &SearchOptions::default()).await?;

    let mut fragments: BTreeMap<LogCategory, HashSet<String>> = BTreeMap::new();
    for entry in found.entries {
        fragments.entry(entry.source).or_default().insert(entry.raw);
    }

    let mut total = 0;
    for (category, raw_lines) in fragments {
        let files = log_files(layout.dir_for(category)).await;
        for path in files {
            let ids = ids.clone();
            let raw_lines = raw_lines.clone();
            let task_path = path.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                redact_file(&task_path, &raw_lines, &ids)
            })
            .await;

            match outcome {
                Ok(Ok(0)) => {}
                Ok(Ok(count)) => {
                    tracing::info!(file = %path.display(), records = count, "Erased subject data");
                    total += count;
                }
                Ok(Err(e)) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to redact log file");
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Redaction task failed");
                }
            }
        }
    }

    tracing::info!(subject = %ids.display_name(), records = total, "Subject erasure complete");
    Ok(total)
}

/// Stream `path` into a replacement file, erasing matching records. The
/// original is only replaced when at least one record changed.
pub(crate) fn redact_file(
    path: &Path,
    raw_lines: &HashSet<String>,
    ids: &SubjectIdentifiers,
) -> LoggerResult<usize> {
    let matcher = SubjectMatcher::new(ids);
    let mut reader = BufReader::new(File::open(path)?);
    let mut replace = AtomicReplace::new(path)?;
    let mut redacted = 0;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        let (body, terminator) = split_terminator(&buf);
        let rewritten = std::str::from_utf8(body)
            .ok()
            .filter(|line| is_candidate(line, raw_lines, &matcher))
            .and_then(|line| redact_line(line, &matcher));

        match rewritten {
            Some(line) => {
                redacted += 1;
                replace.write_all(line.as_bytes())?;
                replace.write_all(terminator)?;
            }
            None => replace.write_all(&buf)?,
        }
    }

    if redacted == 0 {
        return Ok(0);
    }

    replace.commit()?;
    Ok(redacted)
}

fn split_terminator(buf: &[u8]) -> (&[u8], &[u8]) {
    let body_len = if buf.ends_with(b"\r\n") {
        buf.len() - 2
    } else if buf.ends_with(b"\n") {
        buf.len() - 1
    } else {
        buf.len()
    };
    buf.split_at(body_len)
}

fn is_candidate(line: &str, raw_lines: &HashSet<String>, matcher: &SubjectMatcher<'_>) -> bool {
    raw_lines.contains(line)
        || raw_lines.iter().any(|raw| line.contains(raw.as_str()))
        || matcher.prefilter(line)
}

/// Erased form of `line`, or `None` when the line is not JSON, does not
/// match, or has nothing to erase. Only the erased values are replaced; every
/// other byte of the line is kept as written.
fn redact_line(line: &str, matcher: &SubjectMatcher<'_>) -> Option<String> {
    let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line) else {
        return None;
    };

    if !matcher.matches_record(&record) {
        return None;
    }

    let spans = erasable_spans(line, line, matcher);
    if spans.is_empty() {
        return None;
    }

    splice(line, spans)
}

/// Byte ranges in `line` of redactable values in `object` (a slice of
/// `line`) that match the subject, including those of a nested `fields`
/// object
fn erasable_spans(line: &str, object: &str, matcher: &SubjectMatcher<'_>) -> Vec<Range<usize>> {
    let Ok(members) = serde_json::from_str::<BTreeMap<String, &RawValue>>(object) else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    for key in REDACTABLE_KEYS {
        let Some(raw) = members.get(*key) else {
            continue;
        };
        let matches = serde_json::from_str::<Value>(raw.get())
            .map(|value| matcher.matches_any_identifier(&value))
            .unwrap_or(false);
        if matches {
            spans.extend(span_within(line, raw.get()));
        }
    }

    if let Some(nested) = members.get(NESTED_FIELDS_KEY) {
        if nested.get().starts_with('{') {
            spans.extend(erasable_spans(line, nested.get(), matcher));
        }
    }
    spans
}

fn span_within(line: &str, part: &str) -> Option<Range<usize>> {
    let start = (part.as_ptr() as usize).checked_sub(line.as_ptr() as usize)?;
    let end = start.checked_add(part.len())?;
    (end <= line.len()).then_some(start..end)
}

fn splice(line: &str, mut spans: Vec<Range<usize>>) -> Option<String> {
    spans.sort_by_key(|span| span.start);
    let marker = serde_json::to_string(ERASED_MARKER).ok()?;

    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(line.get(cursor..span.start)?);
        out.push_str(&marker);
        cursor = span.end;
    }
    out.push_str(line.get(cursor..)?);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_redact_file_preserves_other_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("personal.log");
        let matching = json!({
            "time": "2024-03-01T10:00:00Z",
            "message": "login",
            "user_id": 12345,
            "email": "john@example.com",
            "plan": "pro",
        })
        .to_string();
        let other =
            json!({"time": "2024-03-01T10:01:00Z", "message": "login", "user_id": 54321})
                .to_string();
        let content = format!("{}\n{}\nnot json at all 12345\n{}", matching, other, other);
        std::fs::write(&path, &content).unwrap();

        let ids = SubjectIdentifiers {
            user_id: "12345".into(),
            email: "john@example.com".into(),
            ..SubjectIdentifiers::default()
        };
        let raw: HashSet<String> = [matching.clone()].into_iter().collect();
        let count = redact_file(&path, &raw, &ids).unwrap();
        assert_eq!(count, 1);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = rewritten.split('\n').collect();
        assert_eq!(lines.len(), 4);
        let record: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["user_id"], ERASED_MARKER);
        assert_eq!(record["email"], ERASED_MARKER);
        assert_eq!(record["plan"], "pro");
        assert_eq!(lines[1], other);
        assert_eq!(lines[2], "not json at all 12345");
        // No trailing newline in the source, none added
        assert_eq!(lines[3], other);
    }

    #[test]
    fn test_redact_nested_fields() {
        let ids = SubjectIdentifiers::for_user_id("7");
        let matcher = SubjectMatcher::new(&ids);
        let line = json!({"message": "x", "fields": {"user_id": "7", "name": "Ada"}}).to_string();

        let out = redact_line(&line, &matcher).unwrap();
        let record: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(record["fields"]["user_id"], ERASED_MARKER);
        assert_eq!(record["fields"]["name"], "Ada");
    }

    #[test]
    fn test_erasure_keeps_number_and_escape_spelling() {
        let ids = SubjectIdentifiers {
            user_id: "12345".into(),
            email: "john@example.com".into(),
            ..SubjectIdentifiers::default()
        };
        let matcher = SubjectMatcher::new(&ids);
        let line = r#"{"time": "2024-03-01T10:00:00Z", "user_id": 12345, "amount":1.50e2, "note":"caf\u00e9", "fields": {"email" : "john@example.com", "total": 100.0}}"#;

        let out = redact_line(line, &matcher).unwrap();

        let expected = r#"{"time": "2024-03-01T10:00:00Z", "user_id": "[ERASED]", "amount":1.50e2, "note":"caf\u00e9", "fields": {"email" : "[ERASED]", "total": 100.0}}"#;
        assert_eq!(out, expected);
    }

    #[test]
    fn test_no_change_leaves_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("standard.log");
        std::fs::write(&path, "{\"user_id\":1}\n").unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        let ids = SubjectIdentifiers::for_user_id("2");
        let count = redact_file(&path, &HashSet::new(), &ids).unwrap();

        assert_eq!(count, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }
}
