//! Bounded look-ahead prefetching with in-order delivery.
//!
//! A [`Prefetcher`] walks a caller-supplied sequence of frame indices. It
//! keeps the actions for up to `buffer_size` upcoming positions running or
//! finished ahead of the consumer, at most `num_workers` of them executing at
//! once, and hands results back strictly in sequence order through
//! [`Prefetcher::get`], whatever order they complete in.
//!
//! # Guarantees
//!
//! - Delivery order equals sequence order; `get` rejects any other index.
//! - An index is never in flight twice, and is never launched while an
//!   unconsumed result for it is buffered.
//! - Buffered plus in-flight entries never exceed `buffer_size`.
//! - A failed action is reported to the `get` for its index, frees its slot,
//!   and is not retried until the consumer asks for that index again.
//!
//! # Usage
//!
//! ```ignore
//! let prefetcher = Prefetcher::new(factory, indices.clone(), PrefetchConfig::new(8, 8))?;
//! for index in indices {
//!     let frame = prefetcher.get(index).await?;
//!     // consume frame
//! }
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use metrics::counter;
use tokio::sync::{Notify, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use vframe_models::ProcessedFrame;

use crate::error::{WorkerError, WorkerResult};
use crate::frame::{FrameAction, FrameFactory};

/// Prefetcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Positions kept running or finished ahead of the consumer
    pub buffer_size: usize,
    /// Actions allowed to execute concurrently
    pub num_workers: usize,
    /// Action run on every frame
    pub action: FrameAction,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self::new(8, 8)
    }
}

impl PrefetchConfig {
    pub fn new(buffer_size: usize, num_workers: usize) -> Self {
        Self {
            buffer_size,
            num_workers,
            action: FrameAction::Process,
        }
    }

    pub fn with_action(mut self, action: FrameAction) -> Self {
        self.action = action;
        self
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.buffer_size < 1 {
            return Err(WorkerError::config("buffer_size must be at least 1"));
        }
        if self.num_workers < 1 {
            return Err(WorkerError::config("num_workers must be at least 1"));
        }
        Ok(())
    }
}

/// Point-in-time view of a prefetcher's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetcherStats {
    /// Position of the next index `get` will accept
    pub position: usize,
    /// Finished results not yet consumed
    pub buffered: usize,
    /// Tasks launched and not yet finished
    pub in_flight: usize,
    /// Tasks launched since construction
    pub launched: u64,
}

struct State {
    next_pos: usize,
    buffer: HashMap<u64, WorkerResult<ProcessedFrame>>,
    in_flight: HashMap<u64, AbortHandle>,
    closed: bool,
    launched: u64,
}

struct Shared {
    state: Mutex<State>,
    ready: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic: every mutation is a single
        // map insert or remove.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, index: u64, result: WorkerResult<ProcessedFrame>) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.in_flight.remove(&index);
            state.buffer.insert(index, result);
        }
        self.ready.notify_waiters();
    }
}

/// Runs frame actions ahead of a single in-order consumer.
pub struct Prefetcher {
    sequence: Vec<u64>,
    config: PrefetchConfig,
    factory: Arc<dyn FrameFactory>,
    workers: Arc<Semaphore>,
    shared: Arc<Shared>,
}

impl Prefetcher {
    /// Validate the settings and start work on the first window.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        factory: Arc<dyn FrameFactory>,
        sequence: Vec<u64>,
        config: PrefetchConfig,
    ) -> WorkerResult<Self> {
        if sequence.is_empty() {
            return Err(WorkerError::config("frame sequence is empty"));
        }
        config.validate()?;

        let prefetcher = Self {
            sequence,
            config,
            factory,
            workers: Arc::new(Semaphore::new(config.num_workers)),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    next_pos: 0,
                    buffer: HashMap::new(),
                    in_flight: HashMap::new(),
                    closed: false,
                    launched: 0,
                }),
                ready: Notify::new(),
            }),
        };

        {
            let mut state = prefetcher.shared.lock();
            prefetcher.schedule_ahead(&mut state);
        }

        Ok(prefetcher)
    }

    pub fn sequence(&self) -> &[u64] {
        &self.sequence
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Number of positions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.sequence.len() - self.shared.lock().next_pos
    }

    pub fn stats(&self) -> PrefetcherStats {
        let state = self.shared.lock();
        PrefetcherStats {
            position: state.next_pos,
            buffered: state.buffer.len(),
            in_flight: state.in_flight.len(),
            launched: state.launched,
        }
    }

    /// Wait for and take the result for `index`, which must be the next
    /// index in the sequence.
    ///
    /// On success the sequence advances and the window is topped up. A
    /// failed action is returned as-is without advancing; asking for the
    /// same index again relaunches it.
    pub async fn get(&self, index: u64) -> WorkerResult<ProcessedFrame> {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(WorkerError::Closed);
            }
            let expected = *self
                .sequence
                .get(state.next_pos)
                .ok_or(WorkerError::SequenceExhausted { requested: index })?;
            if index != expected {
                return Err(WorkerError::OutOfOrder {
                    requested: index,
                    expected,
                });
            }
            if !state.buffer.contains_key(&index) && !state.in_flight.contains_key(&index) {
                debug!(index, "Relaunching frame after earlier failure");
                self.schedule_ahead(&mut state);
            }
        }

        loop {
            let notified = self.shared.ready.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if state.closed {
                    return Err(WorkerError::Closed);
                }
                if let Some(result) = state.buffer.remove(&index) {
                    let frame = result?;
                    state.next_pos += 1;
                    self.schedule_ahead(&mut state);
                    counter!("vframe_frames_delivered_total").increment(1);
                    return Ok(frame);
                }
            }

            notified.await;
        }
    }

    /// Abort outstanding work and drop buffered results.
    ///
    /// Pending and later `get` calls fail with [`WorkerError::Closed`].
    pub fn close(&self) {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            for (_, handle) in state.in_flight.drain() {
                handle.abort();
            }
            state.buffer.clear();
        }
        self.workers.close();
        self.shared.ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Launch every index in the current window that is neither buffered
    /// nor in flight. Runs under the state lock.
    fn schedule_ahead(&self, state: &mut State) {
        if state.closed {
            return;
        }
        let end = (state.next_pos + self.config.buffer_size).min(self.sequence.len());
        for pos in state.next_pos..end {
            let index = self.sequence[pos];
            if state.buffer.contains_key(&index) || state.in_flight.contains_key(&index) {
                continue;
            }
            let handle = self.launch(index);
            state.in_flight.insert(index, handle);
            state.launched += 1;
        }
    }

    fn launch(&self, index: u64) -> AbortHandle {
        let factory = Arc::clone(&self.factory);
        let workers = Arc::clone(&self.workers);
        let shared = Arc::clone(&self.shared);
        let action = self.config.action;

        let task = tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            let result = run_action(factory.as_ref(), index, action).await;
            if let Err(e) = &result {
                warn!(index, action = %action, error = %e, "Frame action failed");
            }
            shared.complete(index, result);
        });
        task.abort_handle()
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_action(
    factory: &dyn FrameFactory,
    index: u64,
    action: FrameAction,
) -> WorkerResult<ProcessedFrame> {
    let work = async {
        let mut frame = factory.open(index).await?;
        frame.run(action).await
    };

    let frame = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result?,
        Err(panic) => {
            return Err(WorkerError::TaskFailed {
                index,
                reason: panic_message(panic.as_ref()),
            })
        }
    };

    if frame.index != index {
        return Err(WorkerError::malformed(
            index,
            format!("action returned frame {}", frame.index),
        ));
    }
    Ok(frame)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
