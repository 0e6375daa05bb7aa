use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared by the Docent crates.
///
/// Provider and store implementations report failures through this type;
/// the orchestrator in `docent-rag` reclassifies them by the stage in which
/// they occurred.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DocentError {
    fn from(err: toml::de::Error) -> Self {
        DocentError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DocentError {
    fn from(err: toml::ser::Error) -> Self {
        DocentError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DocentError {
    fn from(err: serde_json::Error) -> Self {
        DocentError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Docent operations.
pub type Result<T> = std::result::Result<T, DocentError>;
