//! Worker configuration.

use std::path::PathBuf;

use vframe_storage::DataLayout;

use crate::prefetch::PrefetchConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root holding `frames/` and `frames_metadata/`
    pub data_dir: PathBuf,
    /// Look-ahead window for warm-up and refresh runs
    pub buffer_size: usize,
    /// Concurrent frame actions for warm-up and refresh runs
    pub num_workers: usize,
    /// Upper bound on window and workers for the pipeline driver
    pub max_pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_size: 8,
            num_workers: 8,
            max_pool_size: 32,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("VFRAME_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            buffer_size: std::env::var("VFRAME_BUFFER_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.buffer_size),
            num_workers: std::env::var("VFRAME_NUM_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.num_workers),
            max_pool_size: std::env::var("VFRAME_MAX_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_pool_size),
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    /// Prefetch settings for warm-up style runs.
    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig::new(self.buffer_size, self.num_workers)
    }
}
