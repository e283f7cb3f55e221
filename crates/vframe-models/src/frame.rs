//! Processed frame handed to the in-order consumer.

use serde::Serialize;

use crate::metadata::MetadataRecord;

/// Result of running an action on a frame.
///
/// `content` holds the encoded image bytes when the action needed them
/// (or a later stage loaded them); it stays `None` for cache hits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFrame {
    pub index: u64,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    pub metadata: MetadataRecord,
}

impl ProcessedFrame {
    pub fn new(index: u64, metadata: MetadataRecord) -> Self {
        Self {
            index,
            content: None,
            metadata,
        }
    }

    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Cached boolean answer stored under `answer_key`, if any.
    pub fn answer(&self, answer_key: &str) -> Option<bool> {
        self.metadata.get_bool(answer_key)
    }
}
