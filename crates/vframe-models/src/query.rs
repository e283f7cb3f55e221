//! Detector and image query payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default confidence a result must reach before it is cached as an answer.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Binary classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Yes,
    No,
    Unclear,
}

impl Label {
    /// Boolean reading of the label; `Unclear` has none.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Label::Yes => Some(true),
            Label::No => Some(false),
            Label::Unclear => None,
        }
    }
}

/// Current result attached to an image query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub label: Label,
    /// `None` when the label came from a human reviewer.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl QueryResult {
    pub fn new(label: Label, confidence: f64) -> Self {
        Self {
            label,
            confidence: Some(confidence),
        }
    }

    /// Confidence, treating a reviewer label as certain.
    pub fn confidence_or_certain(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }

    /// The answer this result supports, if it is confident and unambiguous.
    pub fn definitive_answer(&self, threshold: f64) -> Option<bool> {
        if self.confidence_or_certain() >= threshold {
            self.label.as_bool()
        } else {
            None
        }
    }
}

/// An image query as returned by the query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageQuery {
    /// Opaque token used to re-check the query later.
    pub id: String,
    #[serde(default)]
    pub detector_id: Option<String>,
    #[serde(default)]
    pub result: Option<QueryResult>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ImageQuery {
    pub fn definitive_answer(&self, threshold: f64) -> Option<bool> {
        self.result
            .as_ref()
            .and_then(|r| r.definitive_answer(threshold))
    }
}

/// A detector registered with the query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detector {
    pub id: String,
    pub name: String,
    pub query: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// What to look up or create on the query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSpec {
    pub name: String,
    pub query: String,
    pub confidence_threshold: f64,
}

impl DetectorSpec {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_wire_format() {
        let label: Label = serde_json::from_str("\"UNCLEAR\"").unwrap();
        assert_eq!(label, Label::Unclear);
        assert_eq!(serde_json::to_string(&Label::Yes).unwrap(), "\"YES\"");
    }

    #[test]
    fn test_definitive_answer_respects_threshold() {
        assert_eq!(QueryResult::new(Label::Yes, 0.95).definitive_answer(0.9), Some(true));
        assert_eq!(QueryResult::new(Label::No, 0.9).definitive_answer(0.9), Some(false));
        assert_eq!(QueryResult::new(Label::Yes, 0.6).definitive_answer(0.9), None);
        assert_eq!(QueryResult::new(Label::Unclear, 0.99).definitive_answer(0.9), None);
    }

    #[test]
    fn test_reviewer_label_is_certain() {
        let result = QueryResult {
            label: Label::No,
            confidence: None,
        };
        assert_eq!(result.definitive_answer(0.99), Some(false));
    }

    #[test]
    fn test_image_query_parses_minimal_payload() {
        let iq: ImageQuery = serde_json::from_str(
            r#"{"id":"iq_1","result":{"label":"NO","confidence":0.97}}"#,
        )
        .unwrap();
        assert_eq!(iq.id, "iq_1");
        assert_eq!(iq.definitive_answer(0.9), Some(false));

        let pending: ImageQuery = serde_json::from_str(r#"{"id":"iq_2"}"#).unwrap();
        assert_eq!(pending.definitive_answer(0.5), None);
    }

    #[test]
    fn test_detector_defaults_threshold() {
        let detector: Detector =
            serde_json::from_str(r#"{"id":"det_1","name":"robot","query":"Upside down?"}"#)
                .unwrap();
        assert_eq!(detector.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
    }
}
