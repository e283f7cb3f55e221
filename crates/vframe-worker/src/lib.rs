//! Frame processing worker.
//!
//! This crate provides:
//! - An ordered, bounded look-ahead prefetcher over frame actions
//! - Detector-backed frames whose answers are cached per frame on disk
//! - The pipeline driver that consumes frames in order into analysis and video output
//! - Warm-up, refresh and coverage utilities for the metadata cache

pub mod analysis;
pub mod config;
pub mod detector_frame;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod prefetch;
pub mod warmup;

pub use analysis::AnswerCounter;
pub use config::WorkerConfig;
pub use detector_frame::{DetectorFrame, DetectorFrameFactory};
pub use error::{WorkerError, WorkerResult};
pub use frame::{Frame, FrameAction, FrameFactory};
pub use logging::RunLogger;
pub use pipeline::{drive, process_frames, FrameAnalysis, PipelineOptions, RunSummary};
pub use prefetch::{PrefetchConfig, Prefetcher, PrefetcherStats};
pub use warmup::{proportion_with_answer, refresh_answers, warm_up, WarmUpSelection, WarmUpSummary};
