//! Immutable application configuration.
//!
//! Settings are read once from `config.toml` in the app root (every field is
//! optional), command-line overrides are applied on top, and the validated
//! result is passed by reference to training and inference.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// Default filename used to store the app configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to resolve config directory: {0}")]
    Dir(#[from] app_dirs::AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Confidence thresholds must satisfy 0 <= lower <= upper <= 1 (lower={lower}, upper={upper})")]
    InvalidThresholds { lower: f32, upper: f32 },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Full configuration for one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub inference: InferenceSettings,
    #[serde(default)]
    pub augmentation: AugmentationSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
}

/// Hyperparameters for data generation and the similarity training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Synthetic variants generated per class when (re)building a part.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// Width of the learned projection.
    #[serde(default = "default_embed_size")]
    pub embed_size: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default)]
    pub weight_decay: f32,
    /// Contrastive hinge margin for negative pairs.
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Epochs without validation-loss improvement tolerated before stopping.
    /// `None` (or `0` in the file) disables early stopping.
    #[serde(default)]
    pub early_stopping: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Optional reduce-on-plateau learning-rate schedule.
    #[serde(default)]
    pub lr_plateau: Option<PlateauSettings>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            embed_size: default_embed_size(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            weight_decay: 0.0,
            margin: default_margin(),
            early_stopping: None,
            seed: default_seed(),
            lr_plateau: None,
        }
    }
}

/// Reduce-on-plateau scheduler knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauSettings {
    #[serde(default = "default_plateau_factor")]
    pub factor: f32,
    #[serde(default = "default_plateau_patience")]
    pub patience: usize,
    #[serde(default = "default_plateau_min_lr")]
    pub min_lr: f32,
}

impl Default for PlateauSettings {
    fn default() -> Self {
        Self {
            factor: default_plateau_factor(),
            patience: default_plateau_patience(),
            min_lr: default_plateau_min_lr(),
        }
    }
}

/// Live inference thresholds and rendering preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// Probabilities below this are reported as no match.
    #[serde(default = "default_lower")]
    pub lower: f32,
    /// Probabilities at or above this are reported as a match.
    #[serde(default = "default_upper")]
    pub upper: f32,
    /// Pixels added around the stored box when drawing it.
    #[serde(default = "default_relief")]
    pub relief: i32,
    /// Delay between live inference ticks.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Annotate every frame with the band name and probability.
    #[serde(default)]
    pub show_probability: bool,
    /// Opacity of the anchor snapshot blended over displayed frames. Off by
    /// default.
    #[serde(default = "default_anchor_alpha")]
    pub anchor_alpha: f32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            lower: default_lower(),
            upper: default_upper(),
            relief: default_relief(),
            tick_ms: default_tick_ms(),
            show_probability: false,
            anchor_alpha: default_anchor_alpha(),
        }
    }
}

/// Image augmentation strengths used when synthesizing training variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationSettings {
    /// Maximum additive brightness shift as a fraction of full scale.
    #[serde(default = "default_brightness_jitter")]
    pub brightness_jitter: f32,
    /// Maximum relative contrast change.
    #[serde(default = "default_contrast_jitter")]
    pub contrast_jitter: f32,
    /// Maximum crop offset as a fraction of the image side.
    #[serde(default = "default_crop_jitter")]
    pub crop_jitter: f32,
    /// Uniform pixel noise amplitude in 8-bit units.
    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f32,
    #[serde(default = "default_flip_probability")]
    pub flip_probability: f32,
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            brightness_jitter: default_brightness_jitter(),
            contrast_jitter: default_contrast_jitter(),
            crop_jitter: default_crop_jitter(),
            noise_amplitude: default_noise_amplitude(),
            flip_probability: default_flip_probability(),
        }
    }
}

/// Contrast equalization applied to captured snapshots and extra images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_equalize")]
    pub equalize: bool,
    /// Histogram clip limit relative to a uniform distribution.
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f32,
    /// Tiles per side.
    #[serde(default = "default_tile_grid")]
    pub tile_grid: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            equalize: default_equalize(),
            clip_limit: default_clip_limit(),
            tile_grid: default_tile_grid(),
        }
    }
}

/// Values supplied on the command line; `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub num_samples: Option<usize>,
    pub embed_size: Option<usize>,
    pub epochs: Option<usize>,
    pub lower: Option<f32>,
    pub upper: Option<f32>,
    pub early_stopping: Option<usize>,
}

impl AppConfig {
    /// Apply command-line overrides and validate the result.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Result<Self, ConfigError> {
        if let Some(value) = overrides.num_samples {
            self.training.num_samples = value;
        }
        if let Some(value) = overrides.embed_size {
            self.training.embed_size = value;
        }
        if let Some(value) = overrides.epochs {
            self.training.epochs = value;
        }
        if let Some(value) = overrides.lower {
            self.inference.lower = value;
        }
        if let Some(value) = overrides.upper {
            self.inference.upper = value;
        }
        if let Some(value) = overrides.early_stopping {
            self.training.early_stopping = Some(value);
        }
        self.validated()
    }

    /// Normalize sentinel values and reject settings the pipeline cannot use.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.training.early_stopping == Some(0) {
            self.training.early_stopping = None;
        }
        let InferenceSettings { lower, upper, .. } = self.inference;
        if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower > upper {
            return Err(ConfigError::InvalidThresholds { lower, upper });
        }
        if self.training.embed_size == 0 {
            return Err(invalid("training.embed_size", "must be at least 1"));
        }
        if self.training.batch_size == 0 {
            return Err(invalid("training.batch_size", "must be at least 1"));
        }
        if !(self.training.learning_rate > 0.0) {
            return Err(invalid("training.learning_rate", "must be positive"));
        }
        if !(self.training.margin > 0.0) {
            return Err(invalid("training.margin", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.inference.anchor_alpha) {
            return Err(invalid("inference.anchor_alpha", "must be in [0, 1]"));
        }
        if self.capture.tile_grid == 0 {
            return Err(invalid("capture.tile_grid", "must be at least 1"));
        }
        if !(self.capture.clip_limit >= 1.0) {
            return Err(invalid("capture.clip_limit", "must be at least 1"));
        }
        if let Some(plateau) = &self.training.lr_plateau
            && !(plateau.factor > 0.0 && plateau.factor < 1.0)
        {
            return Err(invalid("training.lr_plateau.factor", "must be in (0, 1)"));
        }
        Ok(self)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// Resolve the configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app root, returning defaults if missing.
pub fn load_or_default() -> Result<AppConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load configuration from a specific TOML file, returning defaults if missing.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

fn default_num_samples() -> usize {
    200
}

fn default_embed_size() -> usize {
    256
}

fn default_epochs() -> usize {
    10
}

fn default_batch_size() -> usize {
    128
}

fn default_learning_rate() -> f32 {
    1e-3
}

fn default_margin() -> f32 {
    1.0
}

fn default_seed() -> u64 {
    42
}

fn default_plateau_factor() -> f32 {
    0.1
}

fn default_plateau_patience() -> usize {
    5
}

fn default_plateau_min_lr() -> f32 {
    1e-6
}

fn default_lower() -> f32 {
    0.80
}

fn default_upper() -> f32 {
    0.95
}

fn default_relief() -> i32 {
    10
}

fn default_tick_ms() -> u64 {
    15
}

fn default_anchor_alpha() -> f32 {
    0.0
}

fn default_equalize() -> bool {
    true
}

fn default_clip_limit() -> f32 {
    2.0
}

fn default_tile_grid() -> u32 {
    2
}

fn default_brightness_jitter() -> f32 {
    0.2
}

fn default_contrast_jitter() -> f32 {
    0.25
}

fn default_crop_jitter() -> f32 {
    0.08
}

fn default_noise_amplitude() -> f32 {
    8.0
}

fn default_flip_probability() -> f32 {
    0.5
}
