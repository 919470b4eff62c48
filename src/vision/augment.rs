//! Synthetic training variants.
//!
//! Positive variants keep the object recognisable (small crops, flips and
//! photometric jitter). Negative variants are built from the same image
//! but destroy the object's appearance, for parts that have no captured
//! negative images.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::bbox::BoundingBox;
use crate::config::AugmentationSettings;

pub trait Augmenter {
    /// A variant of `image` that still shows the same object.
    fn positive(&self, image: &RgbImage, rng: &mut StdRng) -> RgbImage;

    /// A variant of `image` that no longer shows the object at `roi`.
    fn negative(&self, image: &RgbImage, roi: Option<BoundingBox>, rng: &mut StdRng) -> RgbImage;
}

#[derive(Debug, Clone)]
pub struct ImageAugmenter {
    settings: AugmentationSettings,
}

impl ImageAugmenter {
    pub fn new(settings: AugmentationSettings) -> Self {
        Self { settings }
    }

    fn jitter_photometric(&self, image: &mut RgbImage, rng: &mut StdRng) {
        let s = &self.settings;
        let (b, c) = (s.brightness_jitter.abs(), s.contrast_jitter.abs());
        let brightness = rng.random_range(-b..=b) * 255.0;
        let contrast = 1.0 + rng.random_range(-c..=c);
        let noise = s.noise_amplitude.max(0.0);
        for pixel in image.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                let mut v = (f32::from(*channel) - 128.0) * contrast + 128.0 + brightness;
                if noise > 0.0 {
                    v += rng.random_range(-noise..=noise);
                }
                *channel = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    fn jitter_crop(&self, image: &RgbImage, rng: &mut StdRng) -> RgbImage {
        let (width, height) = image.dimensions();
        let fraction = self.settings.crop_jitter.clamp(0.0, 0.45);
        let max_dx = (width as f32 * fraction) as u32;
        let max_dy = (height as f32 * fraction) as u32;
        if max_dx == 0 && max_dy == 0 {
            return image.clone();
        }
        let left = rng.random_range(0..=max_dx);
        let right = rng.random_range(0..=max_dx);
        let top = rng.random_range(0..=max_dy);
        let bottom = rng.random_range(0..=max_dy);
        let crop_w = width.saturating_sub(left + right).max(1);
        let crop_h = height.saturating_sub(top + bottom).max(1);
        let cropped = imageops::crop_imm(image, left, top, crop_w, crop_h).to_image();
        imageops::resize(&cropped, width, height, FilterType::Triangle)
    }
}

impl Augmenter for ImageAugmenter {
    fn positive(&self, image: &RgbImage, rng: &mut StdRng) -> RgbImage {
        let mut out = self.jitter_crop(image, rng);
        if rng.random_bool(f64::from(self.settings.flip_probability.clamp(0.0, 1.0))) {
            imageops::flip_horizontal_in_place(&mut out);
        }
        self.jitter_photometric(&mut out, rng);
        out
    }

    fn negative(&self, image: &RgbImage, roi: Option<BoundingBox>, rng: &mut StdRng) -> RgbImage {
        let mut out = match rng.random_range(0..3u8) {
            0 => scramble_tiles(image, 4, rng),
            1 => erase_region(image, roi),
            _ => permute_channels(image, rng),
        };
        self.jitter_photometric(&mut out, rng);
        out
    }
}

/// Cut the image into `grid x grid` tiles and reassemble them in random order.
fn scramble_tiles(image: &RgbImage, grid: u32, rng: &mut StdRng) -> RgbImage {
    let (width, height) = image.dimensions();
    let grid = grid.max(1).min(width.max(1)).min(height.max(1));
    let (tile_w, tile_h) = (width / grid, height / grid);
    if tile_w == 0 || tile_h == 0 {
        return image.clone();
    }
    let mut order: Vec<u32> = (0..grid * grid).collect();
    order.shuffle(rng);
    if order.windows(2).all(|pair| pair[0] < pair[1]) {
        order.rotate_left(1);
    }
    let mut out = image.clone();
    for (dest, &src) in order.iter().enumerate() {
        let dest = dest as u32;
        let tile = imageops::crop_imm(image, (src % grid) * tile_w, (src / grid) * tile_h, tile_w, tile_h).to_image();
        imageops::replace(
            &mut out,
            &tile,
            i64::from((dest % grid) * tile_w),
            i64::from((dest / grid) * tile_h),
        );
    }
    out
}

/// Paint the object region with the mean colour of the frame border.
/// Without a region, the central half of the frame is erased.
fn erase_region(image: &RgbImage, roi: Option<BoundingBox>) -> RgbImage {
    let (width, height) = image.dimensions();
    let region = roi
        .and_then(|bbox| bbox.clamped(width, height))
        .unwrap_or_else(|| {
            BoundingBox::new(
                (width / 4) as i32,
                (height / 4) as i32,
                (width * 3 / 4) as i32,
                (height * 3 / 4) as i32,
            )
        });
    let fill = border_mean(image);
    let mut out = image.clone();
    crate::draw::fill_rect(
        &mut out,
        (i64::from(region.x1), i64::from(region.y1)),
        (i64::from(region.x2), i64::from(region.y2)),
        fill,
    );
    out
}

fn permute_channels(image: &RgbImage, rng: &mut StdRng) -> RgbImage {
    let mut order = [0usize, 1, 2];
    while order == [0, 1, 2] {
        order.shuffle(rng);
    }
    let invert = rng.random_bool(0.5);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let source = pixel.0;
        for (dest, &src) in pixel.0.iter_mut().zip(order.iter()) {
            *dest = if invert { 255 - source[src] } else { source[src] };
        }
    }
    out
}

fn border_mean(image: &RgbImage) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Rgb([0, 0, 0]);
    }
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            for (sum, &v) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += u64::from(v);
            }
            count += 1;
        }
    }
    let count = count.max(1);
    Rgb(sums.map(|sum| (sum / count) as u8))
}
