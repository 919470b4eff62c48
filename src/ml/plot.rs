//! Training curves rendered to `Graphs.png`.
//!
//! The left panel shows train/valid loss, the right panel train/valid
//! accuracy. Train series are red, validation series blue.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use thiserror::Error;

use super::train::EpochMetrics;
use crate::draw;

pub const PLOT_WIDTH: u32 = 1200;
pub const PLOT_HEIGHT: u32 = 600;

const MARGIN: i64 = 40;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([90, 90, 90]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TRAIN: Rgb<u8> = Rgb([220, 40, 40]);
const VALID: Rgb<u8> = Rgb([40, 70, 220]);

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("No epochs to plot")]
    Empty,
    #[error("Failed to save plot {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Render loss and accuracy curves for `history`.
pub fn render_curves(history: &[EpochMetrics]) -> Result<RgbImage, PlotError> {
    if history.is_empty() {
        return Err(PlotError::Empty);
    }
    let mut image = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);
    let half = i64::from(PLOT_WIDTH / 2);
    let loss: Vec<(f32, f32)> = history.iter().map(|m| (m.train.loss, m.valid.loss)).collect();
    let accuracy: Vec<(f32, f32)> = history
        .iter()
        .map(|m| (m.train.accuracy, m.valid.accuracy))
        .collect();
    let loss_top = loss
        .iter()
        .flat_map(|&(t, v)| [t, v])
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    draw_panel(&mut image, 0, half, &loss, loss_top.max(f32::EPSILON));
    draw_panel(&mut image, half, half, &accuracy, 1.0);
    Ok(image)
}

/// Render and save the curves as a PNG.
pub fn save_curves(path: &Path, history: &[EpochMetrics]) -> Result<(), PlotError> {
    let image = render_curves(history)?;
    image.save(path).map_err(|source| PlotError::Save {
        path: path.to_path_buf(),
        source,
    })
}

fn draw_panel(image: &mut RgbImage, left: i64, width: i64, series: &[(f32, f32)], y_max: f32) {
    let height = i64::from(image.height());
    let (x0, x1) = (left + MARGIN, left + width - MARGIN / 2);
    let (y0, y1) = (height - MARGIN, MARGIN / 2);

    for step in 1..=4 {
        let y = y0 - (y0 - y1) * step / 4;
        draw::line(image, (x0, y), (x1, y), GRID);
    }
    draw::line(image, (x0, y0), (x1, y0), AXIS);
    draw::line(image, (x0, y0), (x0, y1), AXIS);

    let point = |idx: usize, value: f32| -> (i64, i64) {
        let span = (series.len().max(2) - 1) as f32;
        let x = x0 as f32 + (x1 - x0) as f32 * idx as f32 / span;
        let norm = if value.is_finite() {
            (value / y_max).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let y = y0 as f32 - (y0 - y1) as f32 * norm;
        (x.round() as i64, y.round() as i64)
    };

    for (pick, color) in [(0usize, TRAIN), (1usize, VALID)] {
        let values: Vec<f32> = series
            .iter()
            .map(|&(train, valid)| if pick == 0 { train } else { valid })
            .collect();
        for (idx, pair) in values.windows(2).enumerate() {
            draw::line(image, point(idx, pair[0]), point(idx + 1, pair[1]), color);
        }
        for (idx, &value) in values.iter().enumerate() {
            let (x, y) = point(idx, value);
            draw::fill_rect(image, (x - 2, y - 2), (x + 3, y + 3), color);
        }
    }
}
