//! Frame geometry helpers shared by the compositor and the encoders

use image::{imageops, Rgb, RgbImage};

/// Largest accepted frame side, guarding against corrupt headers
pub const MAX_FRAME_SIDE: u32 = 8192;

/// Round output dimensions down to even values, as 4:2:0 encoders require
#[must_use]
pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width & !1).max(2), (height & !1).max(2))
}

/// Fit `frame` into a `width` x `height` canvas
///
/// Frames that already match are returned unchanged. Otherwise the frame is
/// scaled preserving its aspect ratio and centered on a black canvas.
#[must_use]
pub fn fit_frame(frame: RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = frame.dimensions();
    if (src_w, src_h) == (width, height) {
        return frame;
    }
    if src_w == 0 || src_h == 0 {
        return RgbImage::new(width, height);
    }

    let scale = (width as f32 / src_w as f32).min(height as f32 / src_h as f32);
    let new_w = ((src_w as f32 * scale).round() as u32).clamp(1, width);
    let new_h = ((src_h as f32 * scale).round() as u32).clamp(1, height);

    let resized = imageops::resize(&frame, new_w, new_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let offset_x = (width - new_w) / 2;
    let offset_y = (height - new_h) / 2;
    imageops::replace(&mut canvas, &resized, i64::from(offset_x), i64::from(offset_y));
    canvas
}

/// Check decoded dimensions before allocating buffers for them
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), String> {
    if width == 0 || height == 0 {
        return Err(format!("Invalid frame dimensions: {width}x{height}"));
    }
    if width > MAX_FRAME_SIDE || height > MAX_FRAME_SIDE {
        return Err(format!(
            "Frame dimensions too large: {width}x{height} (max {MAX_FRAME_SIDE}x{MAX_FRAME_SIDE})"
        ));
    }
    Ok(())
}
