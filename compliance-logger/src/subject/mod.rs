//! Data subject access: search, erasure and export of persisted records.
//!
//! The engine works on the on-disk layout only. It can run against files
//! written by another process, and it does not need a live logger.

mod export;
mod matcher;
mod redact;
mod search;

pub use matcher::{masked_token_matches, SubjectMatcher};
pub use redact::{ERASED_MARKER, REDACTABLE_KEYS};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::sync::watch;

use crate::config::LogLayout;
use crate::error::LoggerResult;
use crate::record::LogCategory;

/// Identifiers of a data subject. A record matches when any non-empty
/// identifier matches; empty strings never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectIdentifiers {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub ip_address: String,
    /// Arbitrary identifiers matched against every key and value
    pub ids: Vec<String>,
    /// Case-insensitive free-text terms
    pub keywords: Vec<String>,
}

impl SubjectIdentifiers {
    pub fn for_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_empty()
            && self.username.is_empty()
            && self.email.is_empty()
            && self.ip_address.is_empty()
            && self.ids.iter().all(String::is_empty)
            && self.keywords.iter().all(String::is_empty)
    }

    /// Label used in results: username, else email, else the user id
    pub fn display_name(&self) -> String {
        if !self.username.is_empty() {
            self.username.clone()
        } else if !self.email.is_empty() {
            self.email.clone()
        } else if !self.user_id.is_empty() {
            format!("User ID: {}", self.user_id)
        } else {
            "unknown subject".to_string()
        }
    }

    /// Every non-empty exact-match identifier (keywords excluded)
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        [
            self.user_id.as_str(),
            self.username.as_str(),
            self.email.as_str(),
            self.ip_address.as_str(),
        ]
        .into_iter()
        .chain(self.ids.iter().map(String::as_str))
        .filter(|id| !id.is_empty())
    }
}

/// A persisted record that matched a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    /// Every key of the record except `time`, `level` and `message`
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub source: LogCategory,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDataResult {
    pub search_time: DateTime<Utc>,
    pub subject: String,
    pub total_entries: usize,
    pub entries: Vec<LogEntry>,
    pub searched_files: Vec<String>,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
}

/// Cooperative cancellation for long searches. The signal is polled once
/// per file.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub cancel: Option<watch::Receiver<bool>>,
    /// Return `LoggerError::Cancelled` instead of the partial result
    pub strict_cancel: bool,
}

impl SearchOptions {
    pub fn with_cancel(cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(cancel),
            strict_cancel: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict_cancel = true;
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }
}

/// Window used by erasure and export: everything up to a day from now
pub(crate) fn unbounded_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (DateTime::UNIX_EPOCH, Utc::now() + Duration::days(1))
}

/// Subject access operations over one directory layout
#[derive(Debug, Clone)]
pub struct SubjectAccess {
    layout: LogLayout,
}

impl SubjectAccess {
    pub fn new(layout: LogLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    /// All records matching `ids` with a timestamp in `[from, to]`
    pub async fn find_logs_for_subject(
        &self,
        ids: &SubjectIdentifiers,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LoggerResult<SubjectDataResult> {
        search::find(&self.layout, ids, from, to, &SearchOptions::default()).await
    }

    pub async fn find_logs_for_subject_with(
        &self,
        ids: &SubjectIdentifiers,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        options: &SearchOptions,
    ) -> LoggerResult<SubjectDataResult> {
        search::find(&self.layout, ids, from, to, options).await
    }

    /// Erase identifying values from every matching record. Returns the
    /// number of records rewritten.
    pub async fn delete_logs_for_subject(&self, ids: &SubjectIdentifiers) -> LoggerResult<usize> {
        redact::erase(&self.layout, ids).await
    }

    /// Write every matching record as indented JSON. Returns the number of
    /// exported entries.
    pub async fn export_logs_for_subject<W>(
        &self,
        ids: &SubjectIdentifiers,
        sink: &mut W,
    ) -> LoggerResult<usize>
    where
        W: AsyncWrite + Unpin,
    {
        export::export(&self.layout, ids, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_priority() {
        let mut ids = SubjectIdentifiers::for_user_id("12345");
        assert_eq!(ids.display_name(), "User ID: 12345");

        ids.email = "john.doe@example.com".into();
        assert_eq!(ids.display_name(), "john.doe@example.com");

        ids.username = "johndoe".into();
        assert_eq!(ids.display_name(), "johndoe");

        assert_eq!(SubjectIdentifiers::default().display_name(), "unknown subject");
    }

    #[test]
    fn test_empty_identifiers() {
        assert!(SubjectIdentifiers::default().is_empty());

        let blank = SubjectIdentifiers {
            ids: vec![String::new()],
            keywords: vec![String::new()],
            ..SubjectIdentifiers::default()
        };
        assert!(blank.is_empty());
        assert_eq!(blank.literals().count(), 0);

        let ids = SubjectIdentifiers {
            ip_address: "10.0.0.7".into(),
            ids: vec!["ord-1".into(), String::new()],
            ..SubjectIdentifiers::default()
        };
        assert_eq!(ids.literals().collect::<Vec<_>>(), vec!["10.0.0.7", "ord-1"]);
    }

    #[test]
    fn test_cancel_flag() {
        let (tx, rx) = watch::channel(false);
        let options = SearchOptions::with_cancel(rx);
        assert!(!options.is_cancelled());
        tx.send(true).unwrap();
        assert!(options.is_cancelled());
        assert!(!SearchOptions::default().is_cancelled());
    }
}
