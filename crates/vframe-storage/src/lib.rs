//! Local frame storage.
//!
//! This crate provides:
//! - Per-frame JSON metadata records with default merging and atomic saves
//! - Read access to extracted frame images
//! - Frame index discovery over the frames directory

pub mod content;
pub mod error;
pub mod layout;
pub mod metadata_store;

pub use content::{parse_frame_index, ContentSource, FrameDirectory};
pub use error::{StorageError, StorageResult};
pub use layout::DataLayout;
pub use metadata_store::MetadataStore;
