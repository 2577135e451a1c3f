//! Error types for the Almanac synchronization core.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record at key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl StorageError {
    /// Whether a bounded retry is worth attempting.
    ///
    /// Corrupt records and failed transactions are permanent; only interrupted
    /// or contended I/O qualifies.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Domain-level errors for the sync core and its CLI surface
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

/// Map a sled error into the storage taxonomy.
pub fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        err.to_string(),
    ))
}

/// Map a serialization error for a given key into the storage taxonomy.
pub fn to_storage_data(key: &str, err: serde_json::Error) -> StorageError {
    StorageError::CorruptRecord {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
