//! Query service abstraction used by frames.

use async_trait::async_trait;
use vframe_models::{Detector, ImageQuery};

use crate::error::MlResult;

/// Remote service that answers a detector's question about an image.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submit `image` to `detector`. Every call is a new, billable query.
    async fn ask(&self, detector: &Detector, image: &[u8]) -> MlResult<ImageQuery>;

    /// Re-read the current state of an existing query without new work.
    async fn fetch(&self, query_id: &str) -> MlResult<ImageQuery>;
}
