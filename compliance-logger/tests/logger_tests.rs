/// Integration tests for routing and retention through the public API
///
/// Tests cover:
/// - Category precedence and the dual-write contract
/// - Sanitization levels applied to the standard copy
/// - Rotation and retention driven through the logger

use compliance_logger::sanitizer::REDACTED_MARKER;
use compliance_logger::{
    fields, ComplianceLogger, LogCategory, LoggerConfig, RetentionConfig, SanitizationLevel,
};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn read_records(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        })
        .unwrap_or_default()
}

fn age_file(path: &Path, days: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(days * 86_400 + 60))
        .unwrap();
}

// =============================================================================
// ROUTING
// =============================================================================

#[test]
fn test_category_precedence() {
    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();

    assert_eq!(
        logger.determine_category(&fields! { "request_path" => "/health" }),
        LogCategory::Standard
    );
    assert_eq!(
        logger.determine_category(&fields! { "ip_address" => "10.0.0.1" }),
        LogCategory::Personal
    );
    assert_eq!(
        logger.determine_category(&fields! { "contact" => "jane.roe@example.com" }),
        LogCategory::Personal
    );
    assert_eq!(
        logger.determine_category(
            &fields! { "email" => "jane.roe@example.com", "api_key" => "sk_live_abc" }
        ),
        LogCategory::Sensitive
    );
    assert_eq!(
        logger.determine_category(&fields! { "note" => "4111 1111 1111 1111" }),
        LogCategory::Sensitive
    );
}

#[test]
fn test_sensitive_record_never_reaches_personal_sink() {
    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();
    let layout = logger.config().layout;

    logger.error(
        "Card declined",
        fields! { "username" => "johndoe", "card_number" => "4111111111111111" },
    );

    assert!(!layout.active_file(LogCategory::Personal).exists());

    let sensitive = read_records(&layout.active_file(LogCategory::Sensitive));
    assert_eq!(sensitive.len(), 1);
    assert_eq!(sensitive[0]["card_number"], "4111111111111111");
    assert_eq!(sensitive[0]["level"], "error");

    let standard = read_records(&layout.active_file(LogCategory::Standard));
    assert_eq!(standard.len(), 1);
    assert_eq!(standard[0]["card_number"], REDACTED_MARKER);
    assert_eq!(standard[0]["message"], "Card declined [Sensitive data redacted]");
    assert!(!fs::read_to_string(layout.active_file(LogCategory::Standard))
        .unwrap()
        .contains("4111111111111111"));
}

#[test]
fn test_camel_case_secret_goes_to_sensitive_sink() {
    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();
    let layout = logger.config().layout;

    logger.info("Key rotated", fields! { "encryptionKey" => "AKIA-super-secret-material" });

    let sensitive = read_records(&layout.active_file(LogCategory::Sensitive));
    assert_eq!(sensitive.len(), 1);
    assert_eq!(sensitive[0]["encryptionKey"], "AKIA-super-secret-material");

    let standard = read_records(&layout.active_file(LogCategory::Standard));
    assert_eq!(standard[0]["encryptionKey"], REDACTED_MARKER);
    assert_eq!(standard[0]["message"], "Key rotated [Sensitive data redacted]");
    assert!(!fs::read_to_string(layout.active_file(LogCategory::Standard))
        .unwrap()
        .contains("AKIA-super-secret-material"));
}

#[test]
fn test_high_sanitization_uses_markers() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = LoggerConfig::with_root(temp_dir.path());
    config.sanitization_level = SanitizationLevel::High;
    let logger = ComplianceLogger::new(config).unwrap();
    let layout = logger.config().layout;

    logger.info("Profile viewed", fields! { "phone" => "+1 555 123 4567", "page" => 3 });

    let standard = read_records(&layout.active_file(LogCategory::Standard));
    assert_eq!(standard[0]["phone"], "[PERSONAL DATA]");
    assert_eq!(standard[0]["page"], 3);
    assert_eq!(standard[0]["message"], "Profile viewed");
}

#[cfg(unix)]
#[test]
fn test_restricted_sinks_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();
    let layout = logger.config().layout;

    logger.info("login", fields! { "username" => "johndoe", "token" => "abc.def.ghi" });
    logger.info("login", fields! { "username" => "johndoe" });

    for category in [LogCategory::Personal, LogCategory::Sensitive] {
        let mode = fs::metadata(layout.active_file(category)).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "{} log must not be group/other accessible", category);
    }
}

// =============================================================================
// RETENTION
// =============================================================================

#[tokio::test]
async fn test_rotation_through_logger_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();
    let layout = logger.config().layout;

    logger.info("login", fields! { "username" => "johndoe" });
    let active = layout.active_file(LogCategory::Personal);
    let permissions = fs::metadata(&active).unwrap().permissions();
    age_file(&active, 45);

    let report = logger
        .update_retention_config(RetentionConfig {
            personal_days: 30,
            ..RetentionConfig::default()
        })
        .await;
    assert_eq!(report.rotated.len(), 1);
    assert_eq!(read_records(&report.rotated[0]).len(), 1);
    assert_eq!(fs::metadata(&active).unwrap().len(), 0);
    assert_eq!(fs::metadata(&active).unwrap().permissions(), permissions);

    // The fresh file is empty and is left alone. The rotated file kept the
    // old modification time, so it has already expired.
    age_file(&active, 45);
    let second = logger.rotation().rotate_now().await;
    assert!(second.rotated.is_empty());
    assert_eq!(second.skipped_empty, 1);
    assert_eq!(second.deleted, report.rotated);
    assert_eq!(fs::read_dir(layout.dir_for(LogCategory::Personal)).unwrap().count(), 1);

    // New writes land in the fresh active file
    logger.info("logout", fields! { "username" => "johndoe" });
    assert_eq!(read_records(&active).len(), 1);
}

#[tokio::test]
async fn test_expired_rotated_files_are_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();
    let layout = logger.config().layout;

    let dir = layout.dir_for(LogCategory::Sensitive);
    fs::create_dir_all(dir).unwrap();
    let old = dir.join("sensitive.20240101-000000.log");
    fs::write(&old, "{}\n").unwrap();
    age_file(&old, 8);

    let report = logger.rotation().rotate_now().await;
    assert_eq!(report.deleted, vec![old.clone()]);
    assert!(!old.exists());
}

#[tokio::test]
async fn test_update_config_reapplies_retention() {
    let temp_dir = TempDir::new().unwrap();
    let logger = ComplianceLogger::new(LoggerConfig::with_root(temp_dir.path())).unwrap();
    let layout = logger.config().layout;

    logger.info("tick", fields! { "job" => "cleanup" });
    let active = layout.active_file(LogCategory::Standard);
    age_file(&active, 10);

    let mut config = logger.config();
    config.retention.standard_days = 5;
    let report = logger.update_config(config).await.unwrap();

    assert_eq!(report.rotated.len(), 1);
    assert_eq!(logger.retention_config().standard_days, 5);
}
