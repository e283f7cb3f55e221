//! Re-encode processed frames into an MP4 video.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sink for encoded JPEG frames, written in presentation order.
#[async_trait]
pub trait VideoEncoder: Send {
    /// Append one frame.
    async fn write_frame(&mut self, jpeg: &[u8]) -> MediaResult<()>;

    /// Flush and close the output. Later writes fail.
    async fn finish(&mut self) -> MediaResult<()>;
}

/// Rejects frames whose size differs from the first frame seen.
#[derive(Debug, Default, Clone)]
pub struct DimensionGuard {
    expected: Option<(u32, u32)>,
}

impl DimensionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimensions locked in by the first frame, if any.
    pub fn expected(&self) -> Option<(u32, u32)> {
        self.expected
    }

    /// Read the JPEG header and compare against the locked dimensions.
    pub fn check(&mut self, jpeg: &[u8]) -> MediaResult<(u32, u32)> {
        let (width, height) = image::ImageReader::new(Cursor::new(jpeg))
            .with_guessed_format()?
            .into_dimensions()?;

        match self.expected {
            None => {
                self.expected = Some((width, height));
                Ok((width, height))
            }
            Some((w, h)) if (w, h) == (width, height) => Ok((width, height)),
            Some((w, h)) => Err(MediaError::DimensionMismatch {
                expected_width: w,
                expected_height: h,
                actual_width: width,
                actual_height: height,
            }),
        }
    }
}

/// H.264 encoder fed through `ffmpeg -f image2pipe`.
pub struct FfmpegEncoder {
    output: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    guard: DimensionGuard,
    frames: u64,
}

impl FfmpegEncoder {
    /// Start ffmpeg writing to `output` at `fps`.
    pub fn create(output: impl AsRef<Path>, fps: f64) -> MediaResult<Self> {
        let output = output.as_ref().to_path_buf();
        let cmd = encode_command(&output, fps);

        let mut child = FfmpegRunner::new().spawn_with_stdin(&cmd)?;
        let stdin = child.stdin.take();

        info!(output = %output.display(), fps, "Started video encoder");

        Ok(Self {
            output,
            child: Some(child),
            stdin,
            guard: DimensionGuard::new(),
            frames: 0,
        })
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

fn encode_command(output: &Path, fps: f64) -> FfmpegCommand {
    FfmpegCommand::from_stdin(output)
        .input_format("image2pipe")
        .input_framerate(fps)
        .input_arg("-c:v")
        .input_arg("mjpeg")
        .video_codec("libx264")
        .pixel_format("yuv420p")
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn write_frame(&mut self, jpeg: &[u8]) -> MediaResult<()> {
        let stdin = self.stdin.as_mut().ok_or(MediaError::EncoderClosed)?;
        self.guard.check(jpeg)?;
        stdin.write_all(jpeg).await?;
        self.frames += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        let Some(child) = self.child.take() else {
            return Ok(());
        };

        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("encoding {} failed", self.output.display()),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ));
        }

        debug!(output = %self.output.display(), frames = self.frames, "Video encoder finished");
        Ok(())
    }
}
