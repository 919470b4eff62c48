//! Frame preprocessing shared by training data generation and live inference.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Side of the square frames are resized to before cropping.
pub const RESIZE_SIDE: u32 = 256;
/// Side of the centre crop handed to the feature extractor.
pub const CROP_SIDE: u32 = 224;

/// Resize to `RESIZE_SIDE` square, then take the central `CROP_SIDE` square.
pub fn preprocess(frame: &RgbImage) -> RgbImage {
    let resized = imageops::resize(frame, RESIZE_SIDE, RESIZE_SIDE, FilterType::Triangle);
    let offset = (RESIZE_SIDE - CROP_SIDE) / 2;
    imageops::crop_imm(&resized, offset, offset, CROP_SIDE, CROP_SIDE).to_image()
}

/// Contrast-limited adaptive histogram equalization, applied per channel.
///
/// The frame is split into `grid x grid` tiles; each tile's histogram is
/// clipped at `clip_limit` times the uniform bin height, the excess spread
/// evenly, and pixels are mapped by bilinear interpolation between the four
/// nearest tile lookup tables.
pub fn equalize_clahe(frame: &RgbImage, clip_limit: f32, grid: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return frame.clone();
    }
    let grid = grid.max(1).min(width).min(height) as usize;
    let (w, h) = (width as usize, height as usize);
    let tile_x = |i: usize| i * w / grid;
    let tile_y = |j: usize| j * h / grid;

    let mut out = frame.clone();
    for channel in 0..3 {
        let mut luts = vec![[0u8; 256]; grid * grid];
        for ty in 0..grid {
            for tx in 0..grid {
                let mut hist = [0u32; 256];
                for y in tile_y(ty)..tile_y(ty + 1) {
                    for x in tile_x(tx)..tile_x(tx + 1) {
                        hist[frame.get_pixel(x as u32, y as u32)[channel] as usize] += 1;
                    }
                }
                let pixels = ((tile_x(tx + 1) - tile_x(tx)) * (tile_y(ty + 1) - tile_y(ty))) as u32;
                luts[ty * grid + tx] = tile_lut(&mut hist, pixels, clip_limit);
            }
        }

        let tile_w = w as f32 / grid as f32;
        let tile_h = h as f32 / grid as f32;
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let (tx0, tx1, ax) = neighbours(x as f32, tile_w, grid);
            let (ty0, ty1, ay) = neighbours(y as f32, tile_h, grid);
            let value = frame.get_pixel(x, y)[channel] as usize;
            let top = lerp(
                luts[ty0 * grid + tx0][value],
                luts[ty0 * grid + tx1][value],
                ax,
            );
            let bottom = lerp(
                luts[ty1 * grid + tx0][value],
                luts[ty1 * grid + tx1][value],
                ax,
            );
            pixel[channel] = (top + (bottom - top) * ay).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn tile_lut(hist: &mut [u32; 256], pixels: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if pixels == 0 {
        for (value, slot) in lut.iter_mut().enumerate() {
            *slot = value as u8;
        }
        return lut;
    }
    let clip = ((clip_limit * pixels as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (idx, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(idx < remainder);
    }
    let scale = 255.0 / pixels as f32;
    let mut cdf = 0u32;
    for (bin, slot) in hist.iter().zip(lut.iter_mut()) {
        cdf += bin;
        *slot = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

fn neighbours(pos: f32, tile: f32, grid: usize) -> (usize, usize, f32) {
    let f = (pos + 0.5) / tile - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let lo = (f.floor() as usize).min(grid - 1);
    let hi = (lo + 1).min(grid - 1);
    let t = if hi == lo { 0.0 } else { f - lo as f32 };
    (lo, hi, t)
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn preprocess_yields_centre_crop() {
        let frame = RgbImage::from_pixel(640, 360, Rgb([10, 20, 30]));
        let out = preprocess(&frame);
        assert_eq!(out.dimensions(), (CROP_SIDE, CROP_SIDE));
        assert_eq!(*out.get_pixel(100, 100), Rgb([10, 20, 30]));
    }

    #[test]
    fn clahe_stretches_low_contrast_frames() {
        let frame = RgbImage::from_fn(64, 64, |x, _| {
            let v = 100 + (x / 8) as u8;
            Rgb([v, v, v])
        });
        let out = equalize_clahe(&frame, 4.0, 2);
        let spread = |img: &RgbImage| {
            let values: Vec<u8> = img.pixels().map(|p| p[0]).collect();
            values.iter().max().copied().unwrap_or(0) - values.iter().min().copied().unwrap_or(0)
        };
        assert!(spread(&out) > spread(&frame));
    }

    #[test]
    fn clahe_keeps_dimensions_for_tiny_frames() {
        let frame = RgbImage::from_pixel(1, 3, Rgb([5, 5, 5]));
        assert_eq!(equalize_clahe(&frame, 2.0, 8).dimensions(), (1, 3));
    }
}
