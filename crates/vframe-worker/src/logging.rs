//! Structured run logging utilities.
//!
//! Provides consistent, structured logging for warm-up, refresh and
//! pipeline runs with tracing spans and contextual information.

use tracing::{error, info, Span};
use uuid::Uuid;

use crate::error::WorkerError;

/// Default number of frames between progress lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 50;

/// Run logger for structured logging with consistent formatting.
///
/// Every line carries the run ID and operation, so interleaved runs can be
/// told apart in JSON logs.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    operation: String,
    total: u64,
    progress_every: u64,
}

impl RunLogger {
    /// Create a logger for a fresh run over `total` frames.
    pub fn new(operation: &str, total: u64) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            operation: operation.to_string(),
            total,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    /// Log progress every `every` frames instead of the default.
    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            total = self.total,
            "Run started: {}", message
        );
    }

    /// Record that `done` frames have been delivered. Logs only on the
    /// configured interval and on the final frame.
    pub fn log_progress(&self, done: u64) -> bool {
        if !self.should_report(done) {
            return false;
        }
        let percent = if self.total == 0 {
            100.0
        } else {
            done as f64 * 100.0 / self.total as f64
        };
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            done,
            total = self.total,
            "Run progress: {:.1}%", percent
        );
        true
    }

    /// Log the error that ended the run, noting whether asking for the
    /// failed frame again may succeed.
    pub fn log_error(&self, err: &WorkerError) {
        error!(
            run_id = %self.run_id,
            operation = %self.operation,
            retryable = err.is_retryable(),
            "Run error: {}", err
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            operation = %self.operation
        )
    }

    fn should_report(&self, done: u64) -> bool {
        done > 0 && (done % self.progress_every == 0 || done == self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_creation() {
        let logger = RunLogger::new("warm_up", 10);
        assert_eq!(logger.operation(), "warm_up");
        assert_eq!(logger.run_id().len(), 32);
        assert_ne!(logger.run_id(), RunLogger::new("warm_up", 10).run_id());
    }

    #[test]
    fn test_progress_interval() {
        let logger = RunLogger::new("process", 7).with_progress_every(3);
        let reported: Vec<u64> = (0..=7).filter(|&n| logger.log_progress(n)).collect();
        assert_eq!(reported, vec![3, 6, 7]);
    }
}
