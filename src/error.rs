//! Error types for tincan-persist

use thiserror::Error;

/// Main error type for persistence operations.
///
/// Only [`PersistError::Configuration`] ever reaches the caller of
/// [`bind`](crate::persist::bind). Every other variant is produced on the
/// background read/write paths, where it is logged and absorbed.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),
}

/// Result alias used throughout the crate.
pub type PersistResult<T> = Result<T, PersistError>;

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            PersistError::Storage(err.to_string())
        } else {
            PersistError::Deserialization(err.to_string())
        }
    }
}
