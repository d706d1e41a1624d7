//! Record model shared by the router, the rotation manager and the subject
//! access engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::LoggerError;

/// Reserved wire keys written ahead of the structured fields
pub const TIME_KEY: &str = "time";
pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "message";

/// Severity of a log record, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(LoggerError::Configuration(format!("Unknown log level: {}", other))),
        }
    }
}

/// Sensitivity tier of a record, derived from its fields at write time.
/// Ordered by sensitivity so the stricter of two categories is the `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Standard,
    Personal,
    Sensitive,
}

impl LogCategory {
    /// Categories in the order subject access walks them. Standard goes last
    /// since it only ever holds sanitized copies.
    pub const SEARCH_ORDER: [LogCategory; 3] = [Self::Personal, Self::Sensitive, Self::Standard];

    pub const ALL: [LogCategory; 3] = [Self::Standard, Self::Personal, Self::Sensitive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Personal => "personal",
            Self::Sensitive => "sensitive",
        }
    }

    /// Name of the active (non-timestamped) file
    pub fn active_file_name(&self) -> String {
        format!("{}.log", self.as_str())
    }

    /// Name of a rotated file for the given rotation instant
    pub fn rotated_file_name(&self, at: DateTime<Utc>) -> String {
        format!("{}.{}.log", self.as_str(), at.format("%Y%m%d-%H%M%S"))
    }

    /// Permission bits for a freshly created active file
    pub fn file_mode(&self) -> u32 {
        match self {
            Self::Standard => 0o644,
            Self::Personal | Self::Sensitive => 0o600,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "personal" => Ok(Self::Personal),
            "sensitive" => Ok(Self::Sensitive),
            other => Err(LoggerError::Configuration(format!("Unknown log category: {}", other))),
        }
    }
}

/// A structured field value.
///
/// Masking rules are defined per variant, so anything that is not one of the
/// concrete scalar kinds ends up in `Other` and is masked as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Other(serde_json::Value),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Self::Other(v) => v.clone(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => match n.as_f64() {
                    Some(f) => Self::Float(f),
                    None => Self::Other(serde_json::Value::Number(n)),
                },
            },
            other => Self::Other(other),
        }
    }
}

/// Structured fields attached to a record
pub type Fields = BTreeMap<String, FieldValue>;

/// Build the wire form of a record: `time`, `level` and `message` first, then
/// the structured fields. A field that collides with a reserved key is kept
/// under `field.<name>` instead of overwriting it.
pub fn build_record(
    time: DateTime<Utc>,
    level: LogLevel,
    message: &str,
    fields: &Fields,
) -> serde_json::Map<String, serde_json::Value> {
    let mut record = serde_json::Map::new();
    record.insert(TIME_KEY.to_string(), serde_json::Value::String(time.to_rfc3339()));
    record.insert(LEVEL_KEY.to_string(), serde_json::Value::String(level.as_str().to_string()));
    record.insert(MESSAGE_KEY.to_string(), serde_json::Value::String(message.to_string()));

    for (key, value) in fields {
        let key = if is_reserved_key(key) {
            format!("field.{}", key)
        } else {
            key.clone()
        };
        record.insert(key, value.to_json());
    }

    record
}

pub fn is_reserved_key(key: &str) -> bool {
    matches!(key, TIME_KEY | LEVEL_KEY | MESSAGE_KEY)
}
