//! Frame image access.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Source of encoded frame images, addressed by frame index.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Load the encoded bytes for `index`.
    ///
    /// Fails with [`StorageError::NotFound`] when the frame does not exist.
    async fn load(&self, index: u64) -> StorageResult<Vec<u8>>;

    /// Check whether `index` has content without reading it.
    async fn contains(&self, index: u64) -> StorageResult<bool>;
}

/// Directory of extracted frames named `frame_<index>.jpg`.
#[derive(Debug, Clone)]
pub struct FrameDirectory {
    root: PathBuf,
}

impl FrameDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the image for `index`.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.root.join(format!("frame_{}.jpg", index))
    }

    /// All frame indices present in the directory, ascending.
    ///
    /// A directory that does not exist yet has no frames.
    pub async fn discover_indices(&self) -> StorageResult<Vec<u64>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut indices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(index) = entry.file_name().to_str().and_then(parse_frame_index) {
                indices.push(index);
            }
        }
        indices.sort_unstable();

        debug!(root = %self.root.display(), frames = indices.len(), "Discovered frames");
        Ok(indices)
    }

    /// Lowest frame index in the directory.
    pub async fn first_index(&self) -> StorageResult<u64> {
        self.discover_indices()
            .await?
            .first()
            .copied()
            .ok_or_else(|| StorageError::NoFrames(self.root.clone()))
    }

    /// Highest frame index in the directory.
    pub async fn last_index(&self) -> StorageResult<u64> {
        self.discover_indices()
            .await?
            .last()
            .copied()
            .ok_or_else(|| StorageError::NoFrames(self.root.clone()))
    }
}

#[async_trait]
impl ContentSource for FrameDirectory {
    async fn load(&self, index: u64) -> StorageResult<Vec<u8>> {
        let path = self.frame_path(index);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(index, path)),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, index: u64) -> StorageResult<bool> {
        Ok(fs::try_exists(self.frame_path(index)).await?)
    }
}

/// Parse the index out of a `frame_<index>.jpg` file name.
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("frame_")?
        .strip_suffix(".jpg")?
        .parse()
        .ok()
}
