//! Compliance-aware logging with sensitivity routing
//!
//! Every record is classified by the data it carries and written to one of
//! three category directories, each with its own retention period and file
//! permissions. Records holding personal or sensitive data also leave a
//! sanitized copy in the standard log, so day-to-day operations never need
//! to read the restricted files.
//!
//! # Key Features
//!
//! - **Field Classification**: keyword and pattern rules for sensitive
//!   (credentials, card numbers, SSNs) and personal (names, emails, IPs) data
//! - **Level-aware Masking**: `none`, `low`, `medium` or `high` sanitization
//!   of personal data in the standard copy; sensitive values are always
//!   redacted
//! - **Category Routing**: `standard` (0644), `personal` and `sensitive`
//!   (0600) newline-delimited JSON files
//! - **Retention & Rotation**: background task that rotates and expires
//!   files per category
//! - **Subject Access**: search, erase and export all records of a data
//!   subject across every category
//!
//! # Example
//!
//! ```no_run
//! use compliance_logger::{fields, ComplianceLogger, LoggerConfig, SubjectIdentifiers};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logger = ComplianceLogger::new(LoggerConfig::with_root("/var/log/app"))?;
//!     logger.start_rotation()?;
//!
//!     // Personal: full record to personal.log, masked copy to standard.log
//!     logger.info(
//!         "User logged in",
//!         fields! { "user_id" => 12345, "email" => "john.doe@example.com" },
//!     );
//!
//!     // Sensitive: full record to sensitive.log, redacted copy to standard.log
//!     logger.warn("Password reset requested", fields! { "password_hash" => "abc123" });
//!
//!     let erased = logger
//!         .subject_access()
//!         .delete_logs_for_subject(&SubjectIdentifiers::for_user_id("12345"))
//!         .await?;
//!     println!("erased {} records", erased);
//!
//!     logger.stop_rotation().await;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```yaml
//! standard_dir: /var/log/app/standard
//! personal_dir: /var/log/app/personal
//! sensitive_dir: /var/log/app/sensitive
//! sanitization_level: medium
//! min_level: info
//! rotation_interval_secs: 86400
//! retention:
//!   standard_days: 90
//!   personal_days: 30
//!   sensitive_days: 7
//! ```
//!
//! Every key can be overridden from the environment, for example
//! `COMPLIANCE_LOG__RETENTION__PERSONAL_DAYS=14`.

pub mod atomic;
pub mod classifier;
pub mod config;
pub mod error;
pub mod logger;
pub mod macros;
pub mod record;
pub mod rotation;
pub mod sanitizer;
pub mod sink;
pub mod subject;

pub use classifier::{could_be_credit_card, luhn_valid, FieldClassifier, FieldMatchers};
pub use config::{LogLayout, LoggerConfig, RetentionConfig};
pub use error::{LoggerError, LoggerResult};
pub use logger::ComplianceLogger;
pub use record::{FieldValue, Fields, LogCategory, LogLevel};
pub use rotation::{RotationManager, RotationReport};
pub use sanitizer::{mask_email, mask_partial, SanitizationLevel, Sanitizer};
pub use subject::{
    LogEntry, SearchOptions, SubjectAccess, SubjectDataResult, SubjectIdentifiers,
};
