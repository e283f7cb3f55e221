//! FFmpeg CLI wrapper for frame extraction and re-encoding.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - `ffprobe` metadata for frame rate and frame count
//! - Splitting a video into numbered JPEG frames
//! - Piping processed frames back into an H.264 video
//! - A status banner overlay for annotated output

pub mod command;
pub mod encoder;
pub mod error;
pub mod overlay;
pub mod probe;
pub mod split;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encoder::{DimensionGuard, FfmpegEncoder, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use overlay::draw_status_banner;
pub use probe::{probe_video, VideoInfo};
pub use split::{split_video, FRAME_PATTERN};
