//! Split a video into numbered JPEG frames.

use std::path::Path;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// File name pattern of extracted frames, numbered from 0.
pub const FRAME_PATTERN: &str = "frame_%d.jpg";

/// Extract the first `minutes` of `video` (all of it when `None`) into
/// `frames_dir` as `frame_<n>.jpg`.
///
/// Refuses to write into a directory that already holds files so that frame
/// indices never mix between videos. Returns the number of frames requested.
pub async fn split_video(
    video: impl AsRef<Path>,
    frames_dir: impl AsRef<Path>,
    minutes: Option<f64>,
) -> MediaResult<u64> {
    let video = video.as_ref();
    let frames_dir = frames_dir.as_ref();

    ensure_empty_dir(frames_dir).await?;

    let info = probe_video(video).await?;
    if info.fps <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "{} has no usable frame rate",
            video.display()
        )));
    }
    let frames = info.frames_in(minutes);

    info!(
        video = %video.display(),
        frames_dir = %frames_dir.display(),
        frames,
        fps = info.fps,
        "Splitting video into frames"
    );

    let cmd = FfmpegCommand::new(video, frames_dir.join(FRAME_PATTERN))
        .max_frames(frames)
        .start_number(0)
        .quality(2);
    FfmpegRunner::new().run(&cmd).await?;

    Ok(frames)
}

/// Create `dir` if needed and fail if it has any entries.
async fn ensure_empty_dir(dir: &Path) -> MediaResult<()> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(MediaError::DirectoryNotEmpty(dir.to_path_buf()));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
