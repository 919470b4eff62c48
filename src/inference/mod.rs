//! Live match/no-match inference against a trained part.

pub mod decision;
pub mod live;
pub mod overlay;
pub mod session;

use std::path::PathBuf;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::ml::{CheckpointError, ModelError};
use crate::part::{FeatureError, PartError};
use crate::vision::ExtractError;

pub use decision::{ConfidenceBand, Decision, RenderDirective, Thresholds, decide};
pub use live::{AnnotatedFrameWriter, FrameSink, LiveSummary, run_live};
pub use session::{AnnotatedFrame, InferenceSession};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    Part(#[from] PartError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Embedding length {actual} does not match the model input {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Failed to prepare output directory {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write frame {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}
