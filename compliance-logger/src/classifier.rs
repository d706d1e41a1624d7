use regex::Regex;

use crate::error::LoggerResult;
use crate::record::FieldValue;

/// Field names that always mark a record as sensitive
pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "key",
    "secret",
    "jwt",
    "api_key",
    "apikey",
    "access_token",
    "refresh_token",
    "private_key",
    "credit_card",
    "card_number",
    "cvv",
    "ssn",
    "hash",
    "salt",
    "credential",
    "authorization",
];

/// Field names that mark a record as carrying personal data
pub const PERSONAL_KEYWORDS: &[&str] = &[
    "user_id",
    "userid",
    "username",
    "user_name",
    "email",
    "phone",
    "mobile",
    "address",
    "ip",
    "ip_address",
    "remote_addr",
    "session_id",
    "first_name",
    "last_name",
    "full_name",
    "name",
    "birth_date",
    "dob",
    "device_id",
    "location",
];

/// Value-based checks only run on strings at least this long
const MIN_VALUE_LEN: usize = 3;

/// Free-text scanners ignore shorter strings
const MIN_TEXT_LEN: usize = 5;

/// Compiled rule set behind the classifier.
///
/// Built once at startup and handed to the classifier explicitly, so tests and
/// alternate deployments can swap in their own patterns.
#[derive(Debug, Clone)]
pub struct FieldMatchers {
    pub sensitive_keywords: Vec<String>,
    pub personal_keywords: Vec<String>,
    pub sensitive_name_patterns: Vec<Regex>,
    pub personal_name_patterns: Vec<Regex>,
    pub email: Regex,
    pub card_candidate: Regex,
    pub ssn: Regex,
    pub jwt: Regex,
    pub secret_assignment: Regex,
    pub ipv4: Regex,
    pub phone: Regex,
}

impl FieldMatchers {
    pub fn new() -> LoggerResult<Self> {
        Ok(Self {
            sensitive_keywords: SENSITIVE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            personal_keywords: PERSONAL_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            sensitive_name_patterns: vec![
                Regex::new(r"(?i)pass(word|wd|phrase|code)?")?,
                Regex::new(r"(?i)^(x[-_])?auth(orization|[-_]?token|[-_]?header)?$")?,
                Regex::new(r"(?i)api[-_]?key")?,
                Regex::new(r"(?i)bearer")?,
                Regex::new(r"(?i)(client|app)[-_]?secret")?,
            ],
            personal_name_patterns: vec![
                Regex::new(r"(?i)(^|_)(first|last|full|middle|given|family)[-_]?name$")?,
                Regex::new(r"(?i)phone|mobile|msisdn")?,
                Regex::new(r"(?i)e[-_]?mail")?,
                Regex::new(r"(?i)(^|_)ip([-_]?addr(ess)?)?$")?,
                Regex::new(r"(?i)(street|postal|home|billing|shipping)[-_]?(address|code)")?,
                Regex::new(r"(?i)birth|(^|_)dob$")?,
            ],
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            card_candidate: Regex::new(r"\d(?:[ -]?\d){12,18}")?,
            ssn: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b")?,
            jwt: Regex::new(r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+")?,
            secret_assignment: Regex::new(
                r"(?i)\b(password|passwd|pwd|secret|token|api[-_]?key)\s*[:=]\s*\S+",
            )?,
            ipv4: Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b")?,
            phone: Regex::new(r"\b(?:\+1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b")?,
        })
    }

    pub fn with_sensitive_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.sensitive_keywords.push(keyword.into().to_lowercase());
        self
    }

    pub fn with_personal_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.personal_keywords.push(keyword.into().to_lowercase());
        self
    }
}

/// Decides whether a field or free text carries sensitive or personal data.
///
/// Every check is total: classification never fails, it only answers yes/no.
#[derive(Debug, Clone)]
pub struct FieldClassifier {
    matchers: FieldMatchers,
}

impl FieldClassifier {
    pub fn new(matchers: FieldMatchers) -> Self {
        Self { matchers }
    }

    pub fn with_default_rules() -> LoggerResult<Self> {
        Ok(Self::new(FieldMatchers::new()?))
    }

    pub fn matchers(&self) -> &FieldMatchers {
        &self.matchers
    }

    pub fn is_sensitive_field(&self, name: &str, value: &FieldValue) -> bool {
        let name = name.to_lowercase();

        if self
            .matchers
            .sensitive_keywords
            .iter()
            .any(|keyword| name.contains(keyword.as_str()))
        {
            return true;
        }

        if self
            .matchers
            .sensitive_name_patterns
            .iter()
            .any(|pattern| pattern.is_match(&name))
        {
            return true;
        }

        match value.as_str() {
            Some(text) if text.chars().count() >= MIN_VALUE_LEN => {
                self.has_card_number(text) || self.matchers.ssn.is_match(text)
            }
            _ => false,
        }
    }

    pub fn is_personal_field(&self, name: &str, value: &FieldValue) -> bool {
        let name = name.to_lowercase();

        if self
            .matchers
            .personal_keywords
            .iter()
            .any(|keyword| name_matches_keyword(&name, keyword))
        {
            return true;
        }

        if self
            .matchers
            .personal_name_patterns
            .iter()
            .any(|pattern| pattern.is_match(&name))
        {
            return true;
        }

        matches!(value.as_str(), Some(text) if self.is_email(text))
    }

    pub fn is_email_field(&self, name: &str, value: &FieldValue) -> bool {
        let name = name.to_lowercase();
        if name.contains("email") || name == "mail" {
            return true;
        }
        matches!(value.as_str(), Some(text) if self.is_email(text))
    }

    /// Whole-string email check
    pub fn is_email(&self, text: &str) -> bool {
        self.matchers
            .email
            .find(text.trim())
            .map(|m| m.start() == 0 && m.end() == text.trim().len())
            .unwrap_or(false)
    }

    pub fn contains_sensitive_data(&self, text: &str) -> bool {
        if text.chars().count() < MIN_TEXT_LEN {
            return false;
        }

        self.has_card_number(text)
            || self.matchers.ssn.is_match(text)
            || self.matchers.jwt.is_match(text)
            || self.matchers.secret_assignment.is_match(text)
    }

    pub fn contains_personal_data(&self, text: &str) -> bool {
        if text.chars().count() < MIN_TEXT_LEN {
            return false;
        }

        self.matchers.email.is_match(text)
            || self.matchers.ipv4.is_match(text)
            || self.matchers.phone.is_match(text)
    }

    fn has_card_number(&self, text: &str) -> bool {
        self.matchers
            .card_candidate
            .find_iter(text)
            .any(|m| could_be_credit_card(m.as_str()))
    }
}

/// Personal keyword match against a lower-cased field name. Keywords of four
/// characters or fewer only match whole `_`/`-`/`.` separated segments, so
/// `ip` does not fire on `zip` and `name` does not fire on `hostname`.
/// Sensitive keywords always match as plain substrings.
fn name_matches_keyword(name: &str, keyword: &str) -> bool {
    if name == keyword {
        return true;
    }
    if keyword.len() > 4 {
        return name.contains(keyword);
    }
    name.split(|c: char| c == '_' || c == '-' || c == '.')
        .any(|segment| segment == keyword)
}

/// True when `candidate`, with spaces and dashes removed, is a 13-19 digit
/// number passing the Luhn checksum.
pub fn could_be_credit_card(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<u32>>>()
        .unwrap_or_default();

    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    luhn_valid(&digits)
}

/// Luhn checksum over decimal digits
pub fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                *d
            }
        })
        .sum();

    sum % 10 == 0
}
