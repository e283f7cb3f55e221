//! Frames answered by a remote detector, with answers cached on disk.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info};

use vframe_ml_client::QueryService;
use vframe_models::{
    Detector, ImageQuery, MetadataRecord, ProcessedFrame, DEFAULT_ANSWER_KEY, QUERY_ID_KEY,
};
use vframe_storage::{ContentSource, MetadataStore, StorageError};

use crate::error::{WorkerError, WorkerResult};
use crate::frame::{Frame, FrameFactory};

/// Everything a detector frame needs, shared by all frames of a run.
struct FrameContext {
    service: Arc<dyn QueryService>,
    detector: Detector,
    store: MetadataStore,
    source: Arc<dyn ContentSource>,
    answer_key: String,
}

/// Opens [`DetectorFrame`]s backed by one detector, store and content source.
#[derive(Clone)]
pub struct DetectorFrameFactory {
    ctx: Arc<FrameContext>,
}

impl DetectorFrameFactory {
    pub fn new(
        service: Arc<dyn QueryService>,
        detector: Detector,
        store: MetadataStore,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self::with_answer_key(service, detector, store, source, DEFAULT_ANSWER_KEY)
    }

    /// Store the answer under `answer_key` instead of `answer`.
    pub fn with_answer_key(
        service: Arc<dyn QueryService>,
        detector: Detector,
        store: MetadataStore,
        source: Arc<dyn ContentSource>,
        answer_key: impl Into<String>,
    ) -> Self {
        Self {
            ctx: Arc::new(FrameContext {
                service,
                detector,
                store,
                source,
                answer_key: answer_key.into(),
            }),
        }
    }

    pub fn answer_key(&self) -> &str {
        &self.ctx.answer_key
    }

    pub fn detector(&self) -> &Detector {
        &self.ctx.detector
    }

    /// Keys every record is guaranteed to have.
    pub fn defaults(&self) -> MetadataRecord {
        MetadataRecord::new()
            .with(QUERY_ID_KEY, Value::Null)
            .with(self.ctx.answer_key.as_str(), Value::Null)
    }

    /// Open the frame at `index`, creating or completing its record.
    pub async fn open_frame(&self, index: u64) -> WorkerResult<DetectorFrame> {
        if !self.ctx.source.contains(index).await? {
            return Err(WorkerError::NotFound { index });
        }
        let metadata = self.ctx.store.load(index, &self.defaults()).await?;
        Ok(DetectorFrame {
            index,
            metadata,
            content: None,
            ctx: Arc::clone(&self.ctx),
        })
    }
}

#[async_trait]
impl FrameFactory for DetectorFrameFactory {
    async fn open(&self, index: u64) -> WorkerResult<Box<dyn Frame>> {
        Ok(Box::new(self.open_frame(index).await?))
    }
}

/// A frame whose answer comes from the detector and is cached in its record.
pub struct DetectorFrame {
    index: u64,
    metadata: MetadataRecord,
    content: Option<Vec<u8>>,
    ctx: Arc<FrameContext>,
}

impl DetectorFrame {
    /// Raw image bytes, read from the content source on first use.
    pub async fn content(&mut self) -> WorkerResult<&[u8]> {
        let content = match self.content.take() {
            Some(content) => content,
            None => self.ctx.source.load(self.index).await?,
        };
        Ok(self.content.insert(content).as_slice())
    }

    pub fn query_id(&self) -> Option<&str> {
        self.metadata.get_str(QUERY_ID_KEY)
    }

    /// The cached query token, if the frame has been queried.
    ///
    /// Numeric tokens are read in their string form. Any other non-null
    /// value makes the record invalid.
    fn query_token(&self) -> WorkerResult<Option<String>> {
        match self.metadata.get(QUERY_ID_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) => Ok(Some(id.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(StorageError::invalid_record(
                self.ctx.store.record_path(self.index),
                format!("{} must be a string, got {}", QUERY_ID_KEY, other),
            )
            .into()),
        }
    }

    pub fn answer(&self) -> Option<bool> {
        self.metadata.get_bool(&self.ctx.answer_key)
    }

    /// Record the query token, and the answer if the result is definitive.
    ///
    /// Returns `true` if the record changed.
    fn apply_query(&mut self, query: &ImageQuery) -> bool {
        let mut changed = false;

        if self.query_id() != Some(query.id.as_str()) {
            self.metadata.insert(QUERY_ID_KEY, query.id.clone());
            changed = true;
        }

        let threshold = self.ctx.detector.confidence_threshold;
        if let Some(answer) = query.definitive_answer(threshold) {
            if self.answer() != Some(answer) {
                self.metadata.insert(self.ctx.answer_key.as_str(), answer);
                changed = true;
            }
        }

        changed
    }

    fn snapshot(&self) -> ProcessedFrame {
        let frame = ProcessedFrame::new(self.index, self.metadata.clone());
        match &self.content {
            Some(content) => frame.with_content(content.clone()),
            None => frame,
        }
    }
}

#[async_trait]
impl Frame for DetectorFrame {
    fn index(&self) -> u64 {
        self.index
    }

    fn metadata(&self) -> &MetadataRecord {
        &self.metadata
    }

    async fn process(&mut self) -> WorkerResult<ProcessedFrame> {
        if self.query_token()?.is_some() {
            counter!("vframe_cache_hits_total").increment(1);
            debug!(index = self.index, "Frame already queried, using cached record");
            return Ok(self.snapshot());
        }

        let ctx = Arc::clone(&self.ctx);
        let image = self.content().await?;
        let query = ctx.service.ask(&ctx.detector, image).await?;
        counter!("vframe_queries_total", "detector" => ctx.detector.name.clone()).increment(1);

        self.apply_query(&query);
        ctx.store.save(self.index, &self.metadata).await?;

        info!(
            index = self.index,
            query_id = %query.id,
            answer = ?self.answer(),
            "Frame queried"
        );
        Ok(self.snapshot())
    }

    async fn update(&mut self) -> WorkerResult<ProcessedFrame> {
        let query_id = self
            .query_token()?
            .ok_or_else(|| WorkerError::invalid_state(self.index, "frame has not been queried"))?;

        // A definitive answer is final.
        if !self.metadata.is_unset(&self.ctx.answer_key) {
            return Ok(self.snapshot());
        }

        let query = self.ctx.service.fetch(&query_id).await?;
        counter!("vframe_query_refreshes_total").increment(1);

        if self.apply_query(&query) {
            self.ctx.store.save(self.index, &self.metadata).await?;
            info!(index = self.index, answer = ?self.answer(), "Frame answer refreshed");
        } else {
            debug!(index = self.index, "Frame answer still inconclusive");
        }
        Ok(self.snapshot())
    }
}
