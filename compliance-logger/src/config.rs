// Logger configuration
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LoggerError, LoggerResult};
use crate::record::{LogCategory, LogLevel};
use crate::sanitizer::SanitizationLevel;

/// Environment prefix for configuration overrides, e.g.
/// `COMPLIANCE_LOG__RETENTION__PERSONAL_DAYS=30`
pub const ENV_PREFIX: &str = "COMPLIANCE_LOG";

/// One day, the default rotation interval
pub const DEFAULT_ROTATION_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Per-category retention in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub standard_days: u32,
    pub personal_days: u32,
    pub sensitive_days: u32,
}

impl RetentionConfig {
    pub fn days_for(&self, category: LogCategory) -> u32 {
        match category {
            LogCategory::Standard => self.standard_days,
            LogCategory::Personal => self.personal_days,
            LogCategory::Sensitive => self.sensitive_days,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            standard_days: 90,
            personal_days: 30,
            sensitive_days: 7,
        }
    }
}

/// Directory layout: one root directory per category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogLayout {
    pub standard_dir: PathBuf,
    pub personal_dir: PathBuf,
    pub sensitive_dir: PathBuf,
}

impl LogLayout {
    /// Layout with the three category directories under a common root
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            standard_dir: root.join("standard"),
            personal_dir: root.join("personal"),
            sensitive_dir: root.join("sensitive"),
        }
    }

    pub fn dir_for(&self, category: LogCategory) -> &Path {
        match category {
            LogCategory::Standard => &self.standard_dir,
            LogCategory::Personal => &self.personal_dir,
            LogCategory::Sensitive => &self.sensitive_dir,
        }
    }

    pub fn active_file(&self, category: LogCategory) -> PathBuf {
        self.dir_for(category).join(category.active_file_name())
    }
}

impl Default for LogLayout {
    fn default() -> Self {
        Self::under("logs")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    #[serde(flatten)]
    pub layout: LogLayout,
    pub retention: RetentionConfig,
    pub sanitization_level: SanitizationLevel,
    pub min_level: LogLevel,
    pub rotation_interval_secs: u64,
    /// Also classify the message text, not only the fields
    pub scan_messages: bool,
    /// Where to emit an OS-level logrotate stanza (Linux only)
    pub logrotate_config_path: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            layout: LogLayout::default(),
            retention: RetentionConfig::default(),
            sanitization_level: SanitizationLevel::default(),
            min_level: LogLevel::Info,
            rotation_interval_secs: DEFAULT_ROTATION_INTERVAL_SECS,
            scan_messages: false,
            logrotate_config_path: None,
        }
    }
}

impl LoggerConfig {
    /// Default configuration with all category directories under `root`
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            layout: LogLayout::under(root),
            ..Self::default()
        }
    }

    /// Load configuration from an optional file (YAML, TOML or JSON by
    /// extension) overlaid with `COMPLIANCE_LOG__*` environment variables.
    pub fn load(path: Option<&Path>) -> LoggerResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> LoggerResult<()> {
        for category in LogCategory::ALL {
            if self.layout.dir_for(category).as_os_str().is_empty() {
                return Err(LoggerError::Configuration(format!(
                    "Directory for {} logs cannot be empty",
                    category
                )));
            }
        }

        let dirs = [
            &self.layout.standard_dir,
            &self.layout.personal_dir,
            &self.layout.sensitive_dir,
        ];
        for (i, a) in dirs.iter().enumerate() {
            if dirs.iter().skip(i + 1).any(|b| b == a) {
                return Err(LoggerError::Configuration(format!(
                    "Categories must not share a directory: {}",
                    a.display()
                )));
            }
        }

        if self.rotation_interval_secs == 0 {
            return Err(LoggerError::Configuration(
                "Rotation interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
