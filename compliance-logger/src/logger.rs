//! The category router.
//!
//! Every record is classified before it is written. Sensitive records go in
//! full to the sensitive sink, personal records to the personal sink, and both
//! leave a sanitized copy in the standard sink. Standard records are written
//! once.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::classifier::FieldClassifier;
use crate::config::{LoggerConfig, RetentionConfig};
use crate::error::{LoggerError, LoggerResult};
use crate::record::{build_record, Fields, FieldValue, LogCategory, LogLevel};
use crate::rotation::{emit_os_rotation_config, RotationManager, RotationReport};
use crate::sanitizer::{SanitizationLevel, Sanitizer, PERSONAL_MARKER, REDACTED_MARKER};
use crate::sink::CategorySinks;
use crate::subject::SubjectAccess;

/// Appended to the message of the standard copy of a sensitive record
pub const SENSITIVE_SUFFIX: &str = " [Sensitive data redacted]";

/// Field attached by [`ComplianceLogger::with_request_id`]
pub const REQUEST_ID_FIELD: &str = "request_id";

struct LoggerInner {
    config: Arc<RwLock<LoggerConfig>>,
    classifier: Arc<FieldClassifier>,
    sanitizer: Sanitizer,
    sinks: CategorySinks,
    rotation: RotationManager,
}

/// Compliance-aware logger.
///
/// Cloning is cheap and clones share sinks, configuration and the rotation
/// task. Context fields are per handle: [`with_context`](Self::with_context)
/// returns a new handle and leaves the original untouched.
#[derive(Clone)]
pub struct ComplianceLogger {
    inner: Arc<LoggerInner>,
    context: Arc<Fields>,
}

impl ComplianceLogger {
    /// Create a logger with the default classification rules
    pub fn new(config: LoggerConfig) -> LoggerResult<Self> {
        let classifier = Arc::new(FieldClassifier::with_default_rules()?);
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(
        config: LoggerConfig,
        classifier: Arc<FieldClassifier>,
    ) -> LoggerResult<Self> {
        config.validate()?;

        let config = Arc::new(RwLock::new(config));
        let inner = LoggerInner {
            rotation: RotationManager::new(Arc::clone(&config)),
            sanitizer: Sanitizer::new(Arc::clone(&classifier)),
            sinks: CategorySinks::new(),
            config,
            classifier,
        };

        Ok(Self {
            inner: Arc::new(inner),
            context: Arc::new(Fields::new()),
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> LoggerConfig {
        self.inner.config.read().clone()
    }

    pub fn classifier(&self) -> &Arc<FieldClassifier> {
        &self.inner.classifier
    }

    pub fn rotation(&self) -> &RotationManager {
        &self.inner.rotation
    }

    /// Start the background rotation task (one pass now, then per interval)
    pub fn start_rotation(&self) -> LoggerResult<()> {
        self.inner.rotation.start()
    }

    pub async fn stop_rotation(&self) {
        self.inner.rotation.stop().await;
    }

    pub fn retention_config(&self) -> RetentionConfig {
        self.inner.rotation.retention_config()
    }

    pub async fn update_retention_config(&self, retention: RetentionConfig) -> RotationReport {
        self.inner.rotation.update_retention_config(retention).await
    }

    /// Replace the whole configuration and run a rotation pass with it.
    ///
    /// A running rotation task is restarted when the interval changes.
    pub async fn update_config(&self, config: LoggerConfig) -> LoggerResult<RotationReport> {
        config.validate()?;

        let interval_changed = {
            let mut current = self.inner.config.write();
            let changed = current.rotation_interval_secs != config.rotation_interval_secs;
            *current = config.clone();
            changed
        };
        tracing::info!("Logger configuration updated");
        emit_os_rotation_config(&config);

        if interval_changed && self.inner.rotation.is_running() {
            self.inner.rotation.stop().await;
            self.inner.rotation.start()?;
        }

        Ok(self.inner.rotation.rotate_now().await)
    }

    /// Subject access over the currently configured directories
    pub fn subject_access(&self) -> SubjectAccess {
        SubjectAccess::new(self.inner.config.read().layout.clone())
    }

    /// New handle whose records all carry `fields`. Fields given at the call
    /// site win over context fields with the same name.
    pub fn with_context(&self, fields: Fields) -> Self {
        let mut context = (*self.context).clone();
        context.extend(fields);
        Self {
            inner: Arc::clone(&self.inner),
            context: Arc::new(context),
        }
    }

    /// New handle tagged with a fresh `request_id`
    pub fn with_request_id(&self) -> Self {
        let mut fields = Fields::new();
        fields.insert(
            REQUEST_ID_FIELD.to_string(),
            FieldValue::String(uuid::Uuid::new_v4().to_string()),
        );
        self.with_context(fields)
    }

    pub fn context(&self) -> &Fields {
        &self.context
    }

    /// Category a record with these fields would be routed to, ignoring
    /// the message.
    pub fn determine_category(&self, fields: &Fields) -> LogCategory {
        let classifier = &self.inner.classifier;

        if fields
            .iter()
            .any(|(name, value)| classifier.is_sensitive_field(name, value))
        {
            return LogCategory::Sensitive;
        }

        if fields
            .iter()
            .any(|(name, value)| classifier.is_personal_field(name, value))
        {
            return LogCategory::Personal;
        }

        LogCategory::Standard
    }

    fn message_category(&self, message: &str) -> LogCategory {
        let classifier = &self.inner.classifier;
        if classifier.contains_sensitive_data(message) {
            LogCategory::Sensitive
        } else if classifier.contains_personal_data(message) {
            LogCategory::Personal
        } else {
            LogCategory::Standard
        }
    }

    /// Write a record, returning the first sink failure
    pub fn try_log(&self, level: LogLevel, message: &str, fields: Fields) -> LoggerResult<()> {
        let (layout, min_level, sanitization_level, scan_messages) = {
            let config = self.inner.config.read();
            (
                config.layout.clone(),
                config.min_level,
                config.sanitization_level,
                config.scan_messages,
            )
        };

        if level < min_level {
            return Ok(());
        }

        let mut merged = (*self.context).clone();
        merged.extend(fields);

        let field_category = self.determine_category(&merged);
        let message_category = if scan_messages {
            self.message_category(message)
        } else {
            LogCategory::Standard
        };
        let category = field_category.max(message_category);

        let now = Utc::now();
        let sinks = &self.inner.sinks;

        if category == LogCategory::Standard {
            let record = build_record(now, level, message, &merged);
            return sinks.append(&layout, LogCategory::Standard, &record);
        }

        let full = sinks.append(&layout, category, &build_record(now, level, message, &merged));

        let sanitized = self.inner.sanitizer.sanitize(&merged, sanitization_level);
        let mut standard_message = if message_category > LogCategory::Standard {
            scrub_message(message_category, sanitization_level, message)
        } else {
            message.to_string()
        };
        if category == LogCategory::Sensitive {
            standard_message.push_str(SENSITIVE_SUFFIX);
        }
        let copy = sinks.append(
            &layout,
            LogCategory::Standard,
            &build_record(now, level, &standard_message, &sanitized),
        );

        full.and(copy)
    }

    /// Write a record; failures are reported through `tracing` instead of
    /// being returned.
    pub fn log(&self, level: LogLevel, message: &str, fields: Fields) {
        if let Err(e) = self.try_log(level, message, fields) {
            report_write_failure(level, &e);
        }
    }

    pub fn debug(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Warn, message, fields);
    }

    pub fn error(&self, message: &str, fields: Fields) {
        self.log(LogLevel::Error, message, fields);
    }

    /// Write the record, then terminate the process with exit status 1
    pub fn fatal(&self, message: &str, fields: Fields) -> ! {
        self.log(LogLevel::Fatal, message, fields);
        std::process::exit(1)
    }
}

impl std::fmt::Debug for ComplianceLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceLogger")
            .field("config", &*self.inner.config.read())
            .field("context_fields", &self.context.len())
            .finish()
    }
}

/// Message for the standard copy when the message text itself was flagged
fn scrub_message(category: LogCategory, level: SanitizationLevel, message: &str) -> String {
    match (category, level) {
        (LogCategory::Sensitive, _) => REDACTED_MARKER.to_string(),
        (_, SanitizationLevel::None) => message.to_string(),
        _ => PERSONAL_MARKER.to_string(),
    }
}

fn report_write_failure(level: LogLevel, error: &LoggerError) {
    tracing::error!(level = %level, error = %error, "Failed to write compliance log record");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use tempfile::TempDir;

    fn logger(dir: &TempDir) -> ComplianceLogger {
        ComplianceLogger::new(LoggerConfig::with_root(dir.path())).unwrap()
    }

    fn read_records(logger: &ComplianceLogger, category: LogCategory) -> Vec<serde_json::Value> {
        let path = logger.config().layout.active_file(category);
        match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_standard_record_written_once() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        logger.info("Server started", fields! { "port" => 8080 });

        let standard = read_records(&logger, LogCategory::Standard);
        assert_eq!(standard.len(), 1);
        assert_eq!(standard[0]["message"], "Server started");
        assert_eq!(standard[0]["level"], "info");
        assert_eq!(standard[0]["port"], 8080);
        assert!(standard[0]["time"].is_string());
        assert!(read_records(&logger, LogCategory::Personal).is_empty());
        assert!(read_records(&logger, LogCategory::Sensitive).is_empty());
    }

    #[test]
    fn test_personal_record_dual_write() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        logger.info(
            "User logged in",
            fields! { "username" => "johndoe", "email" => "john.doe@example.com" },
        );

        let personal = read_records(&logger, LogCategory::Personal);
        assert_eq!(personal.len(), 1);
        assert_eq!(personal[0]["email"], "john.doe@example.com");

        let standard = read_records(&logger, LogCategory::Standard);
        assert_eq!(standard.len(), 1);
        assert_eq!(standard[0]["message"], "User logged in");
        assert_eq!(standard[0]["email"], "jo****oe@example.com");
        assert_eq!(standard[0]["username"], "j*****e");
    }

    #[test]
    fn test_sensitive_wins_over_personal() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        let fields = fields! { "user_id" => 12345, "password" => "hunter22" };
        assert_eq!(logger.determine_category(&fields), LogCategory::Sensitive);
        logger.warn("Password reset", fields);

        let sensitive = read_records(&logger, LogCategory::Sensitive);
        assert_eq!(sensitive.len(), 1);
        assert_eq!(sensitive[0]["password"], "hunter22");
        assert!(read_records(&logger, LogCategory::Personal).is_empty());

        let standard = read_records(&logger, LogCategory::Standard);
        assert_eq!(standard[0]["message"], "Password reset [Sensitive data redacted]");
        assert_eq!(standard[0]["password"], REDACTED_MARKER);
        assert_eq!(standard[0]["user_id"], "[MASKED_ID]");
    }

    #[test]
    fn test_below_min_level_dropped() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        logger.debug("noise", fields! { "password" => "hunter22" });

        assert!(read_records(&logger, LogCategory::Standard).is_empty());
        assert!(read_records(&logger, LogCategory::Sensitive).is_empty());
    }

    #[test]
    fn test_with_context_does_not_mutate_original() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        let scoped = logger.with_context(fields! { "component" => "billing", "region" => "eu" });

        scoped.info("scoped", fields! { "region" => "us" });
        logger.info("plain", Fields::new());

        assert!(logger.context().is_empty());
        let standard = read_records(&logger, LogCategory::Standard);
        assert_eq!(standard[0]["component"], "billing");
        assert_eq!(standard[0]["region"], "us");
        assert!(standard[1].get("component").is_none());
    }

    #[test]
    fn test_request_id_is_uuid() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir).with_request_id();
        let request_id = logger.context()[REQUEST_ID_FIELD].as_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&request_id).is_ok());
    }

    #[test]
    fn test_message_scanning_escalates() {
        let dir = TempDir::new().unwrap();
        let mut config = LoggerConfig::with_root(dir.path());
        config.scan_messages = true;
        let logger = ComplianceLogger::new(config).unwrap();

        logger.info("Contact jane.roe@example.com for access", Fields::new());

        let personal = read_records(&logger, LogCategory::Personal);
        assert_eq!(personal.len(), 1);
        let standard = read_records(&logger, LogCategory::Standard);
        assert_eq!(standard[0]["message"], PERSONAL_MARKER);
    }

    #[test]
    fn test_reserved_field_names_do_not_clobber() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        logger.info("real message", fields! { "message" => "spoofed" });

        let standard = read_records(&logger, LogCategory::Standard);
        assert_eq!(standard[0]["message"], "real message");
        assert_eq!(standard[0]["field.message"], "spoofed");
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);

        let mut config = logger.config();
        config.rotation_interval_secs = 0;
        assert!(logger.update_config(config).await.is_err());

        let mut config = logger.config();
        config.min_level = LogLevel::Error;
        logger.update_config(config).await.unwrap();
        logger.warn("dropped", Fields::new());
        assert!(read_records(&logger, LogCategory::Standard).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_update_config_rewrites_os_rotation_config() {
        let dir = TempDir::new().unwrap();
        let stanza = dir.path().join("compliance-logger.logrotate");
        let mut config = LoggerConfig::with_root(dir.path());
        config.logrotate_config_path = Some(stanza.clone());
        let logger = ComplianceLogger::new(config).unwrap();

        let mut config = logger.config();
        config.retention.personal_days = 3;
        logger.update_config(config).await.unwrap();

        let rendered = std::fs::read_to_string(&stanza).unwrap();
        assert!(rendered.contains("rotate 3\n"));
        assert!(rendered.contains("maxage 3\n"));
    }
}
