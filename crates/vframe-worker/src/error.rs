//! Worker error types.

use thiserror::Error;
use vframe_media::MediaError;
use vframe_ml_client::MlError;
use vframe_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No content for frame {index}")]
    NotFound { index: u64 },

    #[error("Frame {index} is in an invalid state: {reason}")]
    InvalidState { index: u64, reason: String },

    #[error("Frame {requested} requested out of order, expected {expected}")]
    OutOfOrder { requested: u64, expected: u64 },

    #[error("Frame {requested} requested after the sequence was exhausted")]
    SequenceExhausted { requested: u64 },

    #[error("Prefetcher is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed result for frame {index}: {reason}")]
    MalformedResult { index: u64, reason: String },

    #[error("Task for frame {index} failed: {reason}")]
    TaskFailed { index: u64, reason: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("ML service error: {0}")]
    Ml(#[from] MlError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl From<StorageError> for WorkerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { index, .. } => WorkerError::NotFound { index },
            other => WorkerError::Storage(other),
        }
    }
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_state(index: u64, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            index,
            reason: reason.into(),
        }
    }

    pub fn malformed(index: u64, reason: impl Into<String>) -> Self {
        Self::MalformedResult {
            index,
            reason: reason.into(),
        }
    }

    /// Check if asking for the same frame again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Ml(e) => e.is_retryable(),
            WorkerError::TaskFailed { .. } => true,
            _ => false,
        }
    }
}
