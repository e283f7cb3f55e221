//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use vframe_ml_client::{MlResult, QueryService};
use vframe_models::{Detector, ImageQuery, Label, MetadataRecord, ProcessedFrame, QueryResult};
use vframe_storage::{ContentSource, StorageError, StorageResult};
use vframe_worker::{Frame, FrameFactory, WorkerError, WorkerResult};

/// Records how frame actions overlap.
#[derive(Default)]
pub struct Probe {
    active: Mutex<HashSet<u64>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    entered: Mutex<Vec<u64>>,
    duplicate_entries: AtomicUsize,
}

impl Probe {
    fn enter(&self, index: u64) {
        if !self.active.lock().unwrap().insert(index) {
            self.duplicate_entries.fetch_add(1, Ordering::SeqCst);
        }
        self.entered.lock().unwrap().push(index);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self, index: u64) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.active.lock().unwrap().remove(&index);
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn duplicate_entries(&self) -> usize {
        self.duplicate_entries.load(Ordering::SeqCst)
    }

    pub fn entered(&self) -> Vec<u64> {
        self.entered.lock().unwrap().clone()
    }

    pub fn entries_for(&self, index: u64) -> usize {
        self.entered().iter().filter(|&&i| i == index).count()
    }
}

/// Frames that sleep for a random time and report to a [`Probe`].
pub struct SlowFactory {
    pub probe: Arc<Probe>,
    min_delay_ms: u64,
    max_delay_ms: u64,
    /// Indices whose next action fails, once each
    fail_once: Mutex<HashSet<u64>>,
}

impl SlowFactory {
    /// Each action takes a random time up to `max_delay_ms`.
    pub fn new(max_delay_ms: u64) -> Self {
        Self::with_delays(0, max_delay_ms)
    }

    /// Each action takes exactly `delay_ms`.
    pub fn fixed(delay_ms: u64) -> Self {
        Self::with_delays(delay_ms, delay_ms)
    }

    fn with_delays(min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            min_delay_ms,
            max_delay_ms,
            fail_once: Mutex::new(HashSet::new()),
        }
    }

    pub fn failing_once(self, indices: &[u64]) -> Self {
        self.fail_once.lock().unwrap().extend(indices);
        self
    }
}

#[async_trait]
impl FrameFactory for SlowFactory {
    async fn open(&self, index: u64) -> WorkerResult<Box<dyn Frame>> {
        let fail = self.fail_once.lock().unwrap().remove(&index);
        let delay = rand::rng().random_range(self.min_delay_ms..=self.max_delay_ms);
        Ok(Box::new(SlowFrame {
            index,
            metadata: MetadataRecord::new().with("index", index),
            probe: Arc::clone(&self.probe),
            delay: Duration::from_millis(delay),
            fail,
        }))
    }
}

struct SlowFrame {
    index: u64,
    metadata: MetadataRecord,
    probe: Arc<Probe>,
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl Frame for SlowFrame {
    fn index(&self) -> u64 {
        self.index
    }

    fn metadata(&self) -> &MetadataRecord {
        &self.metadata
    }

    async fn process(&mut self) -> WorkerResult<ProcessedFrame> {
        self.probe.enter(self.index);
        tokio::time::sleep(self.delay).await;
        self.probe.leave(self.index);

        if self.fail {
            return Err(WorkerError::invalid_state(self.index, "scripted failure"));
        }
        Ok(ProcessedFrame::new(self.index, self.metadata.clone()))
    }

    async fn update(&mut self) -> WorkerResult<ProcessedFrame> {
        self.process().await
    }
}

/// Query service answering every image with the same result.
pub struct FixedService {
    result: Mutex<QueryResult>,
    asks: AtomicUsize,
    fetches: AtomicUsize,
    queries: Mutex<HashMap<String, Vec<u8>>>,
}

impl FixedService {
    pub fn new(label: Label, confidence: f64) -> Self {
        Self {
            result: Mutex::new(QueryResult::new(label, confidence)),
            asks: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            queries: Mutex::new(HashMap::new()),
        }
    }

    /// Change what later asks and fetches return.
    pub fn answer_with(&self, label: Label, confidence: f64) {
        *self.result.lock().unwrap() = QueryResult::new(label, confidence);
    }

    pub fn asks(&self) -> usize {
        self.asks.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryService for FixedService {
    async fn ask(&self, detector: &Detector, image: &[u8]) -> MlResult<ImageQuery> {
        let n = self.asks.fetch_add(1, Ordering::SeqCst);
        let id = format!("iq_{}", n);
        self.queries
            .lock()
            .unwrap()
            .insert(id.clone(), image.to_vec());
        Ok(ImageQuery {
            id,
            detector_id: Some(detector.id.clone()),
            result: Some(self.result.lock().unwrap().clone()),
            created_at: None,
        })
    }

    async fn fetch(&self, query_id: &str) -> MlResult<ImageQuery> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ImageQuery {
            id: query_id.to_string(),
            detector_id: None,
            result: Some(self.result.lock().unwrap().clone()),
            created_at: None,
        })
    }
}

/// Content held in memory.
pub struct MemoryContent {
    frames: HashMap<u64, Vec<u8>>,
    loads: AtomicUsize,
}

impl MemoryContent {
    pub fn new(frames: HashMap<u64, Vec<u8>>) -> Self {
        Self {
            frames,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn load(&self, index: u64) -> StorageResult<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.frames
            .get(&index)
            .cloned()
            .ok_or_else(|| StorageError::not_found(index, format!("memory://{}", index)))
    }

    async fn contains(&self, index: u64) -> StorageResult<bool> {
        Ok(self.frames.contains_key(&index))
    }
}

pub fn test_detector() -> Detector {
    Detector {
        id: "det_test".to_string(),
        name: "robot_detector".to_string(),
        query: "Is the robot currently upside down (feet above head)?".to_string(),
        confidence_threshold: 0.9,
    }
}

/// A small solid-colour JPEG.
pub fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    let img = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
    let mut buf = Vec::new();
    JpegEncoder::new(&mut buf).encode_image(&img).unwrap();
    buf
}
