//! Populate and inspect the metadata cache without consuming results.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use vframe_storage::FrameDirectory;

use crate::error::{WorkerError, WorkerResult};
use crate::frame::{Frame, FrameAction, FrameFactory};
use crate::logging::RunLogger;
use crate::prefetch::{PrefetchConfig, Prefetcher};

/// Which frames a warm-up run covers.
#[derive(Debug, Clone, PartialEq)]
pub enum WarmUpSelection {
    /// Random share in `(0, 1]` of the frames on disk.
    Proportion(f64),
    /// These frames, in this order.
    Indices(Vec<u64>),
}

impl WarmUpSelection {
    /// Resolve to a concrete, non-empty index list.
    ///
    /// A proportion samples `ceil(len * p)` of `discovered` without
    /// replacement and returns them sorted.
    pub fn resolve(&self, discovered: &[u64]) -> WorkerResult<Vec<u64>> {
        match self {
            WarmUpSelection::Proportion(p) => {
                if !(*p > 0.0 && *p <= 1.0) {
                    return Err(WorkerError::config(format!(
                        "proportion must be in (0, 1], got {}",
                        p
                    )));
                }
                if discovered.is_empty() {
                    return Err(WorkerError::config("no frames found to sample from"));
                }
                let amount = ((discovered.len() as f64) * p).ceil() as usize;
                let mut sample: Vec<u64> = discovered
                    .choose_multiple(&mut rand::rng(), amount.min(discovered.len()))
                    .copied()
                    .collect();
                sample.sort_unstable();
                Ok(sample)
            }
            WarmUpSelection::Indices(indices) => {
                if indices.is_empty() {
                    return Err(WorkerError::config("index list is empty"));
                }
                Ok(indices.clone())
            }
        }
    }
}

/// Outcome of a warm-up or refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmUpSummary {
    /// Frames the action ran on, in order
    pub indices: Vec<u64>,
    /// Of those, frames whose record has a definitive answer afterwards
    pub answered: u64,
}

/// Run the `process` action over the selected frames so later runs hit the
/// cache.
pub async fn warm_up(
    factory: Arc<dyn FrameFactory>,
    frames: &FrameDirectory,
    selection: WarmUpSelection,
    config: PrefetchConfig,
    answer_key: &str,
) -> WorkerResult<WarmUpSummary> {
    let discovered = match &selection {
        WarmUpSelection::Proportion(_) => frames.discover_indices().await?,
        WarmUpSelection::Indices(_) => Vec::new(),
    };
    let indices = selection.resolve(&discovered)?;
    drain(
        "warm_up",
        factory,
        indices,
        config.with_action(FrameAction::Process),
        answer_key,
    )
    .await
}

/// Run the `update` action over `indices`, resolving answers that were
/// inconclusive when first queried.
pub async fn refresh_answers(
    factory: Arc<dyn FrameFactory>,
    indices: Vec<u64>,
    config: PrefetchConfig,
    answer_key: &str,
) -> WorkerResult<WarmUpSummary> {
    if indices.is_empty() {
        return Err(WorkerError::config("index list is empty"));
    }
    drain(
        "refresh",
        factory,
        indices,
        config.with_action(FrameAction::Update),
        answer_key,
    )
    .await
}

async fn drain(
    operation: &str,
    factory: Arc<dyn FrameFactory>,
    indices: Vec<u64>,
    config: PrefetchConfig,
    answer_key: &str,
) -> WorkerResult<WarmUpSummary> {
    let logger = RunLogger::new(operation, indices.len() as u64);
    logger.log_start(&format!(
        "buffer_size={}, num_workers={}",
        config.buffer_size, config.num_workers
    ));

    let prefetcher = Prefetcher::new(factory, indices.clone(), config)?;
    let mut answered = 0;
    for (done, &index) in indices.iter().enumerate() {
        let frame = prefetcher
            .get(index)
            .await
            .inspect_err(|e| logger.log_error(e))?;
        if frame.answer(answer_key).is_some() {
            answered += 1;
        }
        logger.log_progress(done as u64 + 1);
    }

    logger.log_completion(&format!("{} of {} frames answered", answered, indices.len()));
    Ok(WarmUpSummary { indices, answered })
}

/// Share of `indices` whose current record satisfies `predicate`.
///
/// Only opens each frame; no action runs and nothing is queried.
pub async fn proportion_with_answer<P>(
    factory: &dyn FrameFactory,
    indices: &[u64],
    predicate: P,
) -> WorkerResult<f64>
where
    P: Fn(&dyn Frame) -> bool,
{
    if indices.is_empty() {
        return Err(WorkerError::config("index list is empty"));
    }

    let mut matching = 0usize;
    for &index in indices {
        let frame = factory.open(index).await?;
        if predicate(&*frame) {
            matching += 1;
        }
    }
    Ok(matching as f64 / indices.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportion_bounds() {
        let frames: Vec<u64> = (0..10).collect();
        for p in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                WarmUpSelection::Proportion(p).resolve(&frames),
                Err(WorkerError::Config(_))
            ));
        }
    }

    #[test]
    fn test_proportion_rounds_up_and_samples_distinct() {
        let frames: Vec<u64> = (100..110).collect();
        let sample = WarmUpSelection::Proportion(0.25).resolve(&frames).unwrap();

        assert_eq!(sample.len(), 3);
        assert!(sample.windows(2).all(|w| w[0] < w[1]));
        assert!(sample.iter().all(|i| frames.contains(i)));

        let all = WarmUpSelection::Proportion(1.0).resolve(&frames).unwrap();
        assert_eq!(all, frames);
    }

    #[test]
    fn test_explicit_indices_keep_order() {
        let sample = WarmUpSelection::Indices(vec![9, 2, 2, 5]).resolve(&[]).unwrap();
        assert_eq!(sample, vec![9, 2, 2, 5]);
        assert!(WarmUpSelection::Indices(vec![]).resolve(&[1]).is_err());
    }

    #[test]
    fn test_proportion_needs_frames() {
        assert!(matches!(
            WarmUpSelection::Proportion(0.5).resolve(&[]),
            Err(WorkerError::Config(_))
        ));
    }
}
