//! Frame abstraction consumed by the prefetcher.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use vframe_models::{MetadataRecord, ProcessedFrame};

use crate::error::{WorkerError, WorkerResult};

/// Which idempotent action a prefetch task runs on its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameAction {
    /// Query once and cache the answer.
    #[default]
    Process,
    /// Re-check an earlier, inconclusive query.
    Update,
}

impl FrameAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameAction::Process => "process",
            FrameAction::Update => "update",
        }
    }
}

impl fmt::Display for FrameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameAction {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(FrameAction::Process),
            "update" => Ok(FrameAction::Update),
            other => Err(WorkerError::config(format!(
                "unknown frame action '{}' (expected 'process' or 'update')",
                other
            ))),
        }
    }
}

/// One unit of work, bound to a frame index.
///
/// Instances are short-lived: the prefetcher opens a fresh one per task and
/// drops it afterwards. Durable state lives in the metadata store.
#[async_trait]
pub trait Frame: Send {
    fn index(&self) -> u64;

    /// Current metadata snapshot.
    fn metadata(&self) -> &MetadataRecord;

    /// Compute and cache the answer. No-op if a query already exists.
    async fn process(&mut self) -> WorkerResult<ProcessedFrame>;

    /// Refresh an inconclusive answer from the existing query.
    async fn update(&mut self) -> WorkerResult<ProcessedFrame>;

    async fn run(&mut self, action: FrameAction) -> WorkerResult<ProcessedFrame> {
        match action {
            FrameAction::Process => self.process().await,
            FrameAction::Update => self.update().await,
        }
    }
}

/// Opens frames by index.
#[async_trait]
pub trait FrameFactory: Send + Sync + 'static {
    async fn open(&self, index: u64) -> WorkerResult<Box<dyn Frame>>;
}
