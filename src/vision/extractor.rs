use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

use super::preprocess::preprocess;
use crate::embedding::Embedding;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Cannot extract features from an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("Failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Fixed embedding function over preprocessed frames.
pub trait FeatureExtractor {
    /// Length of every embedding this extractor produces.
    fn dim(&self) -> usize;

    fn extract(&self, image: &RgbImage) -> Result<Embedding, ExtractError>;
}

/// Preprocess a raw frame and embed it.
pub fn embed_frame(extractor: &dyn FeatureExtractor, frame: &RgbImage) -> Result<Embedding, ExtractError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(ExtractError::EmptyImage {
            width: frame.width(),
            height: frame.height(),
        });
    }
    extractor.extract(&preprocess(frame))
}

/// Open an image file as 8-bit RGB.
pub fn open_rgb(path: &Path) -> Result<RgbImage, ExtractError> {
    image::open(path)
        .map(|image| image.to_rgb8())
        .map_err(|source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Colour layout plus colour histogram descriptor.
///
/// The image is divided into a `grid x grid` layout of mean RGB values,
/// followed by a `bins`-bin histogram per channel. The concatenation is
/// scaled to unit L2 norm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorExtractor {
    grid: u32,
    bins: usize,
}

impl Default for DescriptorExtractor {
    fn default() -> Self {
        Self { grid: 8, bins: 16 }
    }
}

impl DescriptorExtractor {
    pub fn new(grid: u32, bins: usize) -> Self {
        Self {
            grid: grid.max(1),
            bins: bins.clamp(1, 256),
        }
    }
}

impl FeatureExtractor for DescriptorExtractor {
    fn dim(&self) -> usize {
        (self.grid * self.grid * 3) as usize + self.bins * 3
    }

    fn extract(&self, image: &RgbImage) -> Result<Embedding, ExtractError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractError::EmptyImage { width, height });
        }
        let grid = self.grid;
        let mut values = Vec::with_capacity(self.dim());

        for gy in 0..grid {
            let (y0, y1) = span(gy, grid, height);
            for gx in 0..grid {
                let (x0, x1) = span(gx, grid, width);
                let mut sums = [0u64; 3];
                let mut count = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        let pixel = image.get_pixel(x, y);
                        for (sum, &v) in sums.iter_mut().zip(pixel.0.iter()) {
                            *sum += u64::from(v);
                        }
                        count += 1;
                    }
                }
                let count = count.max(1) as f32;
                values.extend(sums.iter().map(|&sum| sum as f32 / count / 255.0));
            }
        }

        let mut hist = vec![0u32; self.bins * 3];
        for pixel in image.pixels() {
            for (channel, &v) in pixel.0.iter().enumerate() {
                let bin = usize::from(v) * self.bins / 256;
                hist[channel * self.bins + bin] += 1;
            }
        }
        let total = (width * height) as f32;
        values.extend(hist.iter().map(|&count| count as f32 / total));

        Ok(Embedding::normalized(values))
    }
}

/// Pixel range of cell `idx` when `len` pixels are split into `cells`.
/// Cells are never empty while `len >= cells`.
fn span(idx: u32, cells: u32, len: u32) -> (u32, u32) {
    let start = (u64::from(idx) * u64::from(len) / u64::from(cells)) as u32;
    let end = (u64::from(idx + 1) * u64::from(len) / u64::from(cells)) as u32;
    (start, end.max((start + 1).min(len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn descriptor_length_matches_dim() {
        let extractor = DescriptorExtractor::default();
        let image = RgbImage::from_pixel(32, 32, Rgb([200, 10, 10]));
        let embedding = extractor.extract(&image).unwrap();
        assert_eq!(embedding.len(), extractor.dim());
        assert_eq!(extractor.dim(), 240);
        let norm: f32 = embedding.as_slice().iter().map(|v| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn different_colours_give_different_embeddings() {
        let extractor = DescriptorExtractor::default();
        let red = extractor.extract(&RgbImage::from_pixel(16, 16, Rgb([255, 0, 0]))).unwrap();
        let blue = extractor.extract(&RgbImage::from_pixel(16, 16, Rgb([0, 0, 255]))).unwrap();
        let dot: f32 = red.as_slice().iter().zip(blue.as_slice()).map(|(a, b)| a * b).sum();
        assert!(dot < 0.9);
    }

    #[test]
    fn embed_frame_rejects_empty_frames() {
        let extractor = DescriptorExtractor::default();
        let err = embed_frame(&extractor, &RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyImage { .. }));
    }

    #[test]
    fn tiny_images_still_fill_every_cell() {
        let extractor = DescriptorExtractor::new(4, 8);
        let embedding = extractor.extract(&RgbImage::from_pixel(2, 2, Rgb([9, 9, 9]))).unwrap();
        assert_eq!(embedding.len(), extractor.dim());
    }
}
