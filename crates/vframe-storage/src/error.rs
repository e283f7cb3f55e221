//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Frame {index} not found at {}", path.display())]
    NotFound { index: u64, path: PathBuf },

    #[error("No frames found in {}", .0.display())]
    NoFrames(PathBuf),

    #[error("Invalid metadata record at {}: {reason}", path.display())]
    InvalidRecord { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(index: u64, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            index,
            path: path.into(),
        }
    }

    pub fn invalid_record(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
