//! Storage error types

use sprocket_resilience::Retryable;
use std::io::ErrorKind;
use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object under this key
    #[error("No such key: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// Key cannot be mapped onto the backend
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Requested range starts past the end of the object
    #[error("Range starting at byte {start} is past the end of {key} ({size} bytes)")]
    InvalidRange { key: String, start: u64, size: u64 },

    /// The operation did not complete in time
    #[error("Timed out accessing {key}")]
    Timeout { key: String },

    /// I/O error
    #[error("I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Backend went away mid-operation; another attempt may succeed
    #[error("Storage backend unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backend-specific error
    #[error("Storage backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StorageError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            key: key.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NoSuchKey { .. })
    }
}

/// I/O failures that end a transfer early without saying anything about
/// the object itself
pub fn is_transient_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut
            | ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn is_transient(&self) -> bool {
        match self {
            StorageError::Timeout { .. } | StorageError::Unavailable { .. } => true,
            StorageError::Io { source, .. } => is_transient_io(source.kind()),
            StorageError::NoSuchKey { .. }
            | StorageError::InvalidKey { .. }
            | StorageError::InvalidRange { .. }
            | StorageError::Backend { .. } => false,
        }
    }
}
