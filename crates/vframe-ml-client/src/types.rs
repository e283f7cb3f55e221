//! Wire types that only exist on the HTTP boundary.

use serde::{Deserialize, Serialize};
use vframe_models::{Detector, DetectorSpec};

/// Page of detectors returned by a name lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorPage {
    #[serde(default)]
    pub results: Vec<Detector>,
}

/// Body for creating a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDetectorRequest {
    pub name: String,
    pub query: String,
    pub confidence_threshold: f64,
}

impl From<&DetectorSpec> for CreateDetectorRequest {
    fn from(spec: &DetectorSpec) -> Self {
        Self {
            name: spec.name.clone(),
            query: spec.query.clone(),
            confidence_threshold: spec.confidence_threshold,
        }
    }
}

/// Account info returned by the connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmI {
    #[serde(default)]
    pub username: Option<String>,
}
