use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid matcher pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to write {category} record: {reason}")]
    Write { category: String, reason: String },

    #[error("Atomic replace of {path} failed: {reason}")]
    AtomicReplace { path: PathBuf, reason: String },

    #[error("Subject search cancelled after collecting {collected} entries")]
    Cancelled { collected: usize },

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type LoggerResult<T> = Result<T, LoggerError>;
