//! Shared data models for frame processing.
//!
//! This crate provides Serde-serializable types for:
//! - Per-frame metadata records persisted between runs
//! - Processed frames handed to the in-order consumer
//! - Detector and image query payloads exchanged with the query service

pub mod frame;
pub mod metadata;
pub mod query;

// Re-export common types
pub use frame::ProcessedFrame;
pub use metadata::{MetadataRecord, DEFAULT_ANSWER_KEY, QUERY_ID_KEY};
pub use query::{Detector, DetectorSpec, ImageQuery, Label, QueryResult, DEFAULT_CONFIDENCE_THRESHOLD};
