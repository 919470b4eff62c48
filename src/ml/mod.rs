//! Similarity model training and scoring.
//!
//! The model, its losses and optimizer are written directly against
//! `ndarray`; training writes checkpoints, a metrics log and curve plots
//! into a part's directory.

pub mod checkpoint;
pub mod dataset;
pub mod loss;
pub mod metrics;
pub mod metrics_log;
pub mod model;
pub mod optim;
pub mod plot;
pub mod scheduler;
pub mod train;

pub use checkpoint::{Checkpoint, CheckpointError};
pub use dataset::{DatasetError, Label, PairDataset};
pub use model::{ModelError, SimilarityModel, SimilarityWeights};
pub use optim::Adam;
pub use scheduler::{LrScheduler, ReduceOnPlateau};
pub use train::{EpochMetrics, FitOptions, TrainingError, TrainingLoop, TrainingReport, TrainingState};
