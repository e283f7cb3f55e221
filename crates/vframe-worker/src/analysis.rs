//! Running count of frames answered `true`.

use vframe_media::draw_status_banner;
use vframe_models::ProcessedFrame;

use crate::error::WorkerResult;
use crate::pipeline::FrameAnalysis;

/// Counts delivered frames whose cached answer is `true`.
///
/// Each frame's metadata gains `<answer_key>_count` with the count so far,
/// and frames carrying content get a status banner: red while the answer is
/// `true`, filled to the share of `true` frames seen, and captioned with
/// `"<caption>: <count>"`.
#[derive(Debug, Clone)]
pub struct AnswerCounter {
    answer_key: String,
    count_key: String,
    caption: String,
    positives: u64,
    seen: u64,
}

impl AnswerCounter {
    /// Counter captioned with the answer key itself.
    pub fn new(answer_key: impl Into<String>) -> Self {
        let answer_key = answer_key.into();
        let count_key = format!("{}_count", answer_key);
        Self {
            caption: answer_key.clone(),
            answer_key,
            count_key,
            positives: 0,
            seen: 0,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Text drawn on the banner for the current count.
    pub fn banner_text(&self) -> String {
        format!("{}: {}", self.caption, self.positives)
    }

    pub fn positives(&self) -> u64 {
        self.positives
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Share of delivered frames answered `true`.
    pub fn fraction(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.positives as f64 / self.seen as f64
        }
    }
}

impl FrameAnalysis for AnswerCounter {
    fn analyze(&mut self, mut frame: ProcessedFrame) -> WorkerResult<ProcessedFrame> {
        let active = frame.answer(&self.answer_key) == Some(true);
        self.seen += 1;
        if active {
            self.positives += 1;
        }

        frame.metadata.insert(self.count_key.as_str(), self.positives);

        if let Some(content) = frame.content.take() {
            frame.content = Some(draw_status_banner(
                &content,
                active,
                self.fraction(),
                &self.banner_text(),
            )?);
        }
        Ok(frame)
    }
}
