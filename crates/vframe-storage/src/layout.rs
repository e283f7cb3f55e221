//! On-disk data layout.

use std::path::{Path, PathBuf};

use crate::content::FrameDirectory;
use crate::metadata_store::MetadataStore;

/// Where frames and their metadata live under a data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub frames_dir: PathBuf,
    pub metadata_dir: PathBuf,
}

impl DataLayout {
    /// Standard layout: `<data_dir>/frames` and `<data_dir>/frames_metadata`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            frames_dir: data_dir.join("frames"),
            metadata_dir: data_dir.join("frames_metadata"),
        }
    }

    pub fn frame_directory(&self) -> FrameDirectory {
        FrameDirectory::new(&self.frames_dir)
    }

    pub fn metadata_store(&self) -> MetadataStore {
        MetadataStore::new(&self.metadata_dir)
    }
}
