//! Client for the remote image query service.
//!
//! Frames are answered by asking a detector a yes/no question about the
//! frame image. The service hands back an image query id straight away and
//! may refine the result later (more model passes, human review), so the
//! id is what gets cached; the answer can be re-read through it without
//! submitting the image again.

pub mod client;
pub mod error;
pub mod service;
pub mod types;

pub use client::{DetectorClient, MlClientConfig};
pub use error::{MlError, MlResult};
pub use service::QueryService;
