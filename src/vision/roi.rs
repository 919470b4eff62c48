use image::RgbImage;

use super::bbox::BoundingBox;

/// Locates the object of interest in a frame.
pub trait RoiDetector {
    /// Box in frame coordinates, or `None` when nothing stands out.
    fn detect(&self, frame: &RgbImage) -> Option<BoundingBox>;
}

/// Saliency box from colour contrast against the frame border.
///
/// The mean colour of a thin border band is taken as background. Pixels
/// whose distance from it exceeds the mean distance by `sigma` standard
/// deviations are foreground; the box spans the rows and columns holding
/// at least `line_fraction` of foreground pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderContrastDetector {
    pub border_fraction: f32,
    pub sigma: f32,
    pub line_fraction: f32,
    /// Boxes covering less of the frame than this are discarded.
    pub min_area_fraction: f32,
}

impl Default for BorderContrastDetector {
    fn default() -> Self {
        Self {
            border_fraction: 0.05,
            sigma: 1.0,
            line_fraction: 0.02,
            min_area_fraction: 0.005,
        }
    }
}

impl RoiDetector for BorderContrastDetector {
    fn detect(&self, frame: &RgbImage) -> Option<BoundingBox> {
        let (width, height) = frame.dimensions();
        if width < 3 || height < 3 {
            return None;
        }
        let band_x = ((width as f32 * self.border_fraction) as u32).max(1);
        let band_y = ((height as f32 * self.border_fraction) as u32).max(1);
        let in_border = |x: u32, y: u32| x < band_x || y < band_y || x >= width - band_x || y >= height - band_y;

        let mut sums = [0f64; 3];
        let mut count = 0f64;
        for (x, y, pixel) in frame.enumerate_pixels() {
            if in_border(x, y) {
                for (sum, &v) in sums.iter_mut().zip(pixel.0.iter()) {
                    *sum += f64::from(v);
                }
                count += 1.0;
            }
        }
        let background = sums.map(|sum| (sum / count.max(1.0)) as f32);

        let distances: Vec<f32> = frame
            .pixels()
            .map(|pixel| {
                pixel
                    .0
                    .iter()
                    .zip(background.iter())
                    .map(|(&v, &b)| (f32::from(v) - b).powi(2))
                    .sum::<f32>()
                    .sqrt()
            })
            .collect();
        let n = distances.len() as f32;
        let mean = distances.iter().sum::<f32>() / n;
        let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / n;
        if variance <= f32::EPSILON {
            return None;
        }
        let threshold = mean + self.sigma * variance.sqrt();

        let mut column_hits = vec![0u32; width as usize];
        let mut row_hits = vec![0u32; height as usize];
        for (idx, &distance) in distances.iter().enumerate() {
            if distance > threshold {
                column_hits[idx % width as usize] += 1;
                row_hits[idx / width as usize] += 1;
            }
        }
        let min_column = ((height as f32 * self.line_fraction) as u32).max(1);
        let min_row = ((width as f32 * self.line_fraction) as u32).max(1);
        let (x1, x2) = extent(&column_hits, min_column)?;
        let (y1, y2) = extent(&row_hits, min_row)?;
        let bbox = BoundingBox::new(x1 as i32, y1 as i32, x2 as i32 + 1, y2 as i32 + 1);

        let frame_area = width as f32 * height as f32;
        if (bbox.area() as f32) < frame_area * self.min_area_fraction {
            return None;
        }
        Some(bbox)
    }
}

fn extent(hits: &[u32], min_hits: u32) -> Option<(usize, usize)> {
    let first = hits.iter().position(|&h| h >= min_hits)?;
    let last = hits.iter().rposition(|&h| h >= min_hits)?;
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame_with_square() -> RgbImage {
        RgbImage::from_fn(120, 80, |x, y| {
            if (40..70).contains(&x) && (20..50).contains(&y) {
                Rgb([230, 40, 40])
            } else {
                Rgb([30, 30, 30])
            }
        })
    }

    #[test]
    fn finds_contrasting_object() {
        let bbox = BorderContrastDetector::default().detect(&frame_with_square()).unwrap();
        assert_eq!(bbox, BoundingBox::new(40, 20, 70, 50));
    }

    #[test]
    fn flat_frame_has_no_roi() {
        let frame = RgbImage::from_pixel(64, 64, Rgb([120, 120, 120]));
        assert_eq!(BorderContrastDetector::default().detect(&frame), None);
    }
}
