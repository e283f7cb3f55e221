//! Status banner drawn onto processed frames.

use std::io::Cursor;

use ab_glyph::{FontRef, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::error::MediaResult;

const BANNER_BACKGROUND: Rgb<u8> = Rgb([24, 24, 24]);
const ACTIVE_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const IDLE_COLOR: Rgb<u8> = Rgb([40, 180, 80]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const JPEG_QUALITY: u8 = 90;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// Draw a bar along the bottom edge of a JPEG frame, captioned with `text`.
///
/// The bar is filled from the left to `fraction` (clamped to `[0, 1]`) and
/// coloured red when `active`, green otherwise. `text` is drawn in white
/// over the bar and clipped to the frame.
pub fn draw_status_banner(
    jpeg: &[u8],
    active: bool,
    fraction: f64,
    text: &str,
) -> MediaResult<Vec<u8>> {
    let mut frame: RgbImage =
        image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = frame.dimensions();

    let banner_height = (height / 12).max(4).min(height);
    let top = (height - banner_height) as i32;

    if width > 0 && banner_height > 0 {
        draw_filled_rect_mut(
            &mut frame,
            Rect::at(0, top).of_size(width, banner_height),
            BANNER_BACKGROUND,
        );

        let filled = (f64::from(width) * fraction.clamp(0.0, 1.0)).round() as u32;
        if filled > 0 {
            let color = if active { ACTIVE_COLOR } else { IDLE_COLOR };
            draw_filled_rect_mut(
                &mut frame,
                Rect::at(0, top).of_size(filled, banner_height),
                color,
            );
        }

        if !text.is_empty() {
            let font = FontRef::try_from_slice(FONT_DATA)?;
            let scale = PxScale::from(banner_height as f32 * 0.8);
            let margin = (banner_height / 10) as i32;
            draw_text_mut(&mut frame, TEXT_COLOR, margin + 2, top + margin, scale, &font, text);
        }
    }

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&frame)?;
    Ok(out.into_inner())
}
