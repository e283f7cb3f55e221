//! Per-frame metadata persistence.
//!
//! Each frame owns one JSON object at `<root>/frame_<index>.json`. Records
//! survive across runs, which is what makes re-running a pipeline cheap:
//! anything already answered is read back instead of queried again.
//!
//! Saves go through a temporary file in the same directory followed by a
//! rename, so a crash mid-write never leaves a truncated record behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};
use vframe_models::MetadataRecord;

use crate::error::{StorageError, StorageResult};

/// Directory-backed store of frame metadata records.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    /// Create a store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `index`.
    pub fn record_path(&self, index: u64) -> PathBuf {
        self.root.join(format!("frame_{}.json", index))
    }

    /// Check whether a record has been written for `index`.
    pub async fn exists(&self, index: u64) -> StorageResult<bool> {
        Ok(fs::try_exists(self.record_path(index)).await?)
    }

    /// Read the record for `index` without merging or writing anything.
    ///
    /// Returns `Ok(None)` if no record exists yet.
    pub async fn read(&self, index: u64) -> StorageResult<Option<MetadataRecord>> {
        let path = self.record_path(index);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(Some(MetadataRecord::from(map))),
            other => Err(StorageError::invalid_record(
                path,
                format!("expected a JSON object, found {}", json_kind(&other)),
            )),
        }
    }

    /// Load the record for `index`, filling in any missing defaults.
    ///
    /// An existing record keeps every key it already has; only keys absent
    /// from it are taken from `defaults`. If anything was added the merged
    /// record is written back. A missing record is created from `defaults`.
    pub async fn load(
        &self,
        index: u64,
        defaults: &MetadataRecord,
    ) -> StorageResult<MetadataRecord> {
        match self.read(index).await? {
            Some(mut record) => {
                if record.merge_defaults(defaults) {
                    debug!(index, "Metadata record gained new default keys");
                    self.save(index, &record).await?;
                }
                Ok(record)
            }
            None => {
                debug!(index, "Creating metadata record from defaults");
                self.save(index, defaults).await?;
                Ok(defaults.clone())
            }
        }
    }

    /// Atomically overwrite the record for `index`.
    pub async fn save(&self, index: u64, record: &MetadataRecord) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;

        let path = self.record_path(index);
        let tmp_path = self
            .root
            .join(format!(".frame_{}.json.{}.tmp", index, uuid::Uuid::new_v4()));

        let json = serde_json::to_vec(record)?;
        fs::write(&tmp_path, &json).await?;

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                warn!(
                    path = %tmp_path.display(),
                    error = %cleanup,
                    "Failed to remove temporary metadata file"
                );
            }
            return Err(e.into());
        }

        debug!(index, path = %path.display(), "Metadata record saved");
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
