//! ML client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("ML client configuration error: {0}")]
    Config(String),

    #[error("ML service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Image query not found: {0}")]
    QueryNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MlError::ServiceUnavailable(_) | MlError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MlError::ServiceUnavailable("503".into()).is_retryable());
        assert!(!MlError::Unauthorized("bad token".into()).is_retryable());
        assert!(!MlError::QueryNotFound("iq_1".into()).is_retryable());
        assert!(!MlError::config("missing token").is_retryable());
    }
}
