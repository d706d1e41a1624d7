use serde_json::{Map, Value};

use super::SubjectIdentifiers;
use crate::record::MESSAGE_KEY;

pub(crate) const NESTED_FIELDS_KEY: &str = "fields";
const IP_KEYS: &[&str] = &["remote_addr", "ip", "ip_address"];

/// Matches persisted records against a subject's identifiers
#[derive(Debug)]
pub struct SubjectMatcher<'a> {
    ids: &'a SubjectIdentifiers,
    keywords: Vec<String>,
}

impl<'a> SubjectMatcher<'a> {
    pub fn new(ids: &'a SubjectIdentifiers) -> Self {
        let keywords = ids
            .keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| k.to_lowercase())
            .collect();
        Self { ids, keywords }
    }

    /// Cheap substring check on the raw line, run before JSON decoding
    pub fn prefilter(&self, line: &str) -> bool {
        if self.ids.literals().any(|id| line.contains(id)) {
            return true;
        }
        if self.keywords.is_empty() {
            return false;
        }
        let lowered = line.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// Structured match over the top level and a nested `fields` object
    pub fn matches_record(&self, record: &Map<String, Value>) -> bool {
        if self.matches_object(record) {
            return true;
        }

        if let Some(Value::Object(nested)) = record.get(NESTED_FIELDS_KEY) {
            if self.matches_object(nested) {
                return true;
            }
        }

        self.matches_keywords(record)
    }

    fn matches_object(&self, object: &Map<String, Value>) -> bool {
        let ids = self.ids;

        if field_matches(object, "user_id", &ids.user_id)
            || field_matches(object, "username", &ids.username)
            || field_matches(object, "email", &ids.email)
        {
            return true;
        }

        if IP_KEYS
            .iter()
            .any(|key| field_matches(object, key, &ids.ip_address))
        {
            return true;
        }

        ids.ids.iter().filter(|id| !id.is_empty()).any(|id| {
            object
                .iter()
                .any(|(key, value)| key == id || value_matches(value, id))
        })
    }

    fn matches_keywords(&self, record: &Map<String, Value>) -> bool {
        if self.keywords.is_empty() {
            return false;
        }

        let message = record
            .get(MESSAGE_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let serialized = serde_json::to_string(record)
            .unwrap_or_default()
            .to_lowercase();

        self.keywords
            .iter()
            .any(|k| message.contains(k.as_str()) || serialized.contains(k.as_str()))
    }

    /// True when `value` matches any exact-match identifier of the subject
    pub fn matches_any_identifier(&self, value: &Value) -> bool {
        self.ids.literals().any(|id| value_matches(value, id))
    }
}

fn field_matches(object: &Map<String, Value>, key: &str, identifier: &str) -> bool {
    if identifier.is_empty() {
        return false;
    }
    object
        .get(key)
        .map(|value| value_matches(value, identifier))
        .unwrap_or(false)
}

/// Scalars compare by their string form; masked tokens match heuristically
fn value_matches(value: &Value, identifier: &str) -> bool {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return false,
    };
    text == identifier || masked_token_matches(&text, identifier)
}

/// Heuristic match of a bracketed masked token such as `[jo****oe]` or
/// `[1***5]` against a clear-text identifier.
///
/// The visible prefix (one or two characters before the first `*`) must
/// start the identifier, the visible text after the last `*` must end it,
/// and the identifier must be longer than what is visible.
pub fn masked_token_matches(token: &str, identifier: &str) -> bool {
    let Some(inner) = token
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return false;
    };

    let (Some(first_star), Some(last_star)) = (inner.find('*'), inner.rfind('*')) else {
        return false;
    };

    let prefix = inner.get(..first_star).unwrap_or_default();
    let suffix = inner.get(last_star + 1..).unwrap_or_default();
    let prefix_len = prefix.chars().count();

    if prefix.is_empty() || suffix.is_empty() || prefix_len > 2 {
        return false;
    }

    identifier.chars().count() > prefix_len + suffix.chars().count()
        && identifier.starts_with(prefix)
        && identifier.ends_with(suffix)
}
