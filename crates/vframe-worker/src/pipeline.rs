//! Drive a prefetcher over a video's frames, in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Instrument;

use vframe_media::{probe_video, FfmpegEncoder, MediaError, VideoEncoder};
use vframe_models::ProcessedFrame;
use vframe_storage::ContentSource;

use crate::error::{WorkerError, WorkerResult};
use crate::frame::{FrameAction, FrameFactory};
use crate::logging::RunLogger;
use crate::prefetch::{PrefetchConfig, Prefetcher};

/// Upper bound on look-ahead and workers used by [`process_frames`].
pub const DEFAULT_MAX_POOL_SIZE: usize = 32;

/// Stateful step applied to every delivered frame, in order.
pub trait FrameAnalysis: Send {
    /// Called exactly once per index. Must return a frame for the same index.
    fn analyze(&mut self, frame: ProcessedFrame) -> WorkerResult<ProcessedFrame>;
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub action: FrameAction,
    /// Write delivered frames to this MP4 at the source frame rate
    pub output: Option<PathBuf>,
    pub max_pool_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            action: FrameAction::Process,
            output: None,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames delivered to the consumer
    pub frames: u64,
    /// Frames written to the output video
    pub encoded: u64,
}

/// Run `options.action` over `indices` of `video` and consume the results in
/// order, passing each through `analysis` and into the output video if one
/// is configured.
///
/// Fails before any work starts if the video cannot be probed or reports a
/// non-positive frame rate.
pub async fn process_frames(
    video: &Path,
    factory: Arc<dyn FrameFactory>,
    content: Arc<dyn ContentSource>,
    indices: Vec<u64>,
    analysis: Option<&mut dyn FrameAnalysis>,
    options: &PipelineOptions,
) -> WorkerResult<RunSummary> {
    let info = probe_video(video).await?;
    if info.fps <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "{} reports a non-positive frame rate",
            video.display()
        ))
        .into());
    }

    let encoder = match &options.output {
        Some(path) => {
            let encoder: Box<dyn VideoEncoder> = Box::new(FfmpegEncoder::create(path, info.fps)?);
            Some(encoder)
        }
        None => None,
    };

    drive(factory, content, indices, analysis, encoder, options).await
}

/// Consumer loop behind [`process_frames`], with the encoder injected.
pub async fn drive(
    factory: Arc<dyn FrameFactory>,
    content: Arc<dyn ContentSource>,
    indices: Vec<u64>,
    mut analysis: Option<&mut dyn FrameAnalysis>,
    mut encoder: Option<Box<dyn VideoEncoder>>,
    options: &PipelineOptions,
) -> WorkerResult<RunSummary> {
    if indices.is_empty() {
        return Err(WorkerError::config("no frames to process"));
    }

    let pool = indices.len().min(options.max_pool_size).max(1);
    let config = PrefetchConfig::new(pool, pool).with_action(options.action);
    let logger = RunLogger::new("process_frames", indices.len() as u64);
    let span = logger.create_span();

    async {
        logger.log_start(&format!(
            "{} frames, action={}, pool={}, encode={}",
            indices.len(),
            options.action,
            pool,
            encoder.is_some()
        ));

        let prefetcher = Prefetcher::new(factory, indices.clone(), config)?;
        let mut summary = RunSummary::default();

        for &index in &indices {
            let mut frame = prefetcher.get(index).await?;

            if encoder.is_some() && frame.content.is_none() {
                frame.content = Some(content.load(index).await?);
            }

            if let Some(step) = analysis.as_deref_mut() {
                frame = step.analyze(frame)?;
                if frame.index != index {
                    return Err(WorkerError::malformed(
                        index,
                        format!("analysis returned frame {}", frame.index),
                    ));
                }
            }

            if let Some(encoder) = encoder.as_mut() {
                let jpeg = frame.content.as_deref().ok_or_else(|| {
                    WorkerError::malformed(index, "analysis dropped the frame content")
                })?;
                encoder.write_frame(jpeg).await?;
                summary.encoded += 1;
            }

            summary.frames += 1;
            logger.log_progress(summary.frames);
        }

        prefetcher.close();
        if let Some(encoder) = encoder.as_mut() {
            encoder.finish().await?;
        }

        logger.log_completion(&format!(
            "{} frames delivered, {} encoded",
            summary.frames, summary.encoded
        ));
        Ok::<_, WorkerError>(summary)
    }
    .instrument(span)
    .await
    .inspect_err(|e| logger.log_error(e))
}
