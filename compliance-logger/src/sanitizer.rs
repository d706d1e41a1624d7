use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::classifier::FieldClassifier;
use crate::error::LoggerError;
use crate::record::{FieldValue, Fields};

/// Replacement for sensitive values, applied at every sanitization level
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Replacement for personal values at `high`
pub const PERSONAL_MARKER: &str = "[PERSONAL DATA]";

/// Replacement for identifiers that must not leak even partially
pub const MASKED_ID: &str = "[MASKED_ID]";

/// Fallback for values whose structure is unknown
pub const MASKED_VALUE: &str = "[MASKED]";

/// Result of masking an unparseable email address
pub const UNKNOWN_EMAIL_MASK: &str = "***@***";

/// How aggressively personal fields are masked in the standard sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizationLevel {
    None,
    Low,
    Medium,
    High,
}

impl SanitizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Default for SanitizationLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for SanitizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SanitizationLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(LoggerError::Configuration(format!(
                "Unknown sanitization level: {}",
                other
            ))),
        }
    }
}

/// Level-aware masker for structured fields
#[derive(Debug, Clone)]
pub struct Sanitizer {
    classifier: Arc<FieldClassifier>,
}

impl Sanitizer {
    pub fn new(classifier: Arc<FieldClassifier>) -> Self {
        Self { classifier }
    }

    /// Produce a sanitized copy of `fields`. Sensitive fields are always
    /// redacted; personal fields follow `level`.
    pub fn sanitize(&self, fields: &Fields, level: SanitizationLevel) -> Fields {
        fields
            .iter()
            .map(|(name, value)| (name.clone(), self.sanitize_field(name, value, level)))
            .collect()
    }

    pub fn sanitize_field(
        &self,
        name: &str,
        value: &FieldValue,
        level: SanitizationLevel,
    ) -> FieldValue {
        if self.classifier.is_sensitive_field(name, value) {
            return FieldValue::String(REDACTED_MARKER.to_string());
        }

        if !self.classifier.is_personal_field(name, value) {
            return value.clone();
        }

        match level {
            SanitizationLevel::None => value.clone(),
            SanitizationLevel::Low => match value {
                FieldValue::String(text) if self.classifier.is_email(text) => {
                    FieldValue::String(mask_email(text))
                }
                _ => value.clone(),
            },
            SanitizationLevel::Medium => self.mask_value(name, value),
            SanitizationLevel::High => FieldValue::String(PERSONAL_MARKER.to_string()),
        }
    }

    /// Type-aware masking of a single personal value
    pub fn mask_value(&self, name: &str, value: &FieldValue) -> FieldValue {
        if name == "user_id" {
            return FieldValue::String(MASKED_ID.to_string());
        }

        let id_like = name.to_lowercase().contains("id");

        match value {
            FieldValue::String(text) => {
                if self.classifier.is_email(text) {
                    FieldValue::String(mask_email(text))
                } else {
                    FieldValue::String(mask_partial(text))
                }
            }
            FieldValue::Integer(_) | FieldValue::Float(_) if id_like => {
                FieldValue::String(MASKED_ID.to_string())
            }
            FieldValue::Integer(0) => FieldValue::Integer(0),
            FieldValue::Integer(n) => FieldValue::String(approximate_integer(*n)),
            FieldValue::Float(f) if *f == 0.0 => FieldValue::Float(0.0),
            FieldValue::Float(f) => FieldValue::String(approximate_float(*f)),
            FieldValue::Boolean(b) => FieldValue::Boolean(*b),
            FieldValue::Timestamp(ts) => FieldValue::String(ts.format("%Y-%m-%d").to_string()),
            FieldValue::Other(_) => FieldValue::String(MASKED_VALUE.to_string()),
        }
    }
}

/// Mask an email address, keeping the domain.
///
/// `john.doe@example.com` becomes `jo****oe@example.com`; usernames of four
/// characters or fewer keep only their first character.
pub fn mask_email(email: &str) -> String {
    let parts: Vec<&str> = email.split('@').collect();
    let (username, domain) = match parts.as_slice() {
        [username, domain] => (*username, *domain),
        _ => return UNKNOWN_EMAIL_MASK.to_string(),
    };

    let chars: Vec<char> = username.chars().collect();
    if chars.len() <= 4 {
        let first: String = chars.iter().take(1).collect();
        return format!("{}***@{}", first, domain);
    }

    let head: String = chars.iter().take(2).collect();
    let tail: String = chars.iter().skip(chars.len() - 2).collect();
    format!("{}****{}@{}", head, tail, domain)
}

/// Keep the first and last character, star the rest
pub fn mask_partial(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    match chars.as_slice() {
        [first, middle @ .., last] if !middle.is_empty() => {
            format!("{}{}{}", first, "*".repeat(middle.len()), last)
        }
        _ => "**".to_string(),
    }
}

/// Round an integer down to its power of ten, e.g. 4523 becomes `~1000`
fn approximate_integer(n: i64) -> String {
    let magnitude = n.unsigned_abs();
    let mut power: u64 = 1;
    while power <= magnitude / 10 {
        power *= 10;
    }
    if n < 0 {
        format!("~-{}", power)
    } else {
        format!("~{}", power)
    }
}

fn approximate_float(f: f64) -> String {
    if !f.is_finite() {
        return MASKED_VALUE.to_string();
    }
    let power = 10f64.powf(f.abs().log10().floor());
    if f < 0.0 {
        format!("~-{}", power)
    } else {
        format!("~{}", power)
    }
}
