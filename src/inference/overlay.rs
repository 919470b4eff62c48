//! Drawing decisions onto frames.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::decision::RenderDirective;
use crate::draw;

pub const OUTLINE_THICKNESS: u32 = 2;
/// Height of the status bar drawn in place of caption text.
pub const STATUS_BAR_HEIGHT: u32 = 12;

/// Apply a render directive to `frame`.
///
/// Frames carry no font rendering; a caption is shown as a status bar in
/// the band colour across the top of the frame and is returned so the
/// caller can log or print it.
pub fn render<'a>(frame: &mut RgbImage, directive: &'a RenderDirective) -> Option<&'a str> {
    if let Some(bbox) = directive.outline {
        draw::rect_outline(
            frame,
            (i64::from(bbox.x1), i64::from(bbox.y1)),
            (i64::from(bbox.x2), i64::from(bbox.y2)),
            OUTLINE_THICKNESS,
            directive.color,
        );
    }
    let caption = directive.caption.as_deref()?;
    let bar_height = STATUS_BAR_HEIGHT.min(frame.height());
    draw::fill_rect(
        frame,
        (0, 0),
        (i64::from(frame.width()), i64::from(bar_height)),
        directive.color,
    );
    Some(caption)
}

/// Blend `anchor` over `frame` with opacity `alpha`, resizing the anchor to
/// the frame when needed.
pub fn blend_anchor(frame: &mut RgbImage, anchor: &RgbImage, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 || frame.width() == 0 || frame.height() == 0 {
        return;
    }
    let resized;
    let anchor = if anchor.dimensions() == frame.dimensions() {
        anchor
    } else {
        resized = imageops::resize(anchor, frame.width(), frame.height(), FilterType::Triangle);
        &resized
    };
    for (dest, src) in frame.pixels_mut().zip(anchor.pixels()) {
        for (d, &s) in dest.0.iter_mut().zip(src.0.iter()) {
            let blended = alpha * f32::from(s) + (1.0 - alpha) * f32::from(*d);
            *d = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
}
