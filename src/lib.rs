//! Library exports for reuse in benchmarks and tests.
/// Application directories.
pub mod app_dirs;
/// Frame sources for live inference.
pub mod capture;
/// Command-line parsing.
pub mod cli;
/// Configuration loading and validation.
pub mod config;
/// Raster drawing primitives.
pub mod draw;
/// Shared embedding vectors.
pub mod embedding;
/// Confidence bands, overlays and the live loop.
pub mod inference;
/// Tracing setup.
pub mod logging;
/// Similarity model, dataset and training loop.
pub mod ml;
/// On-disk part storage.
pub mod part;
/// Part lifecycle operations.
pub mod pipeline;
/// Image preprocessing, features and augmentation.
pub mod vision;
