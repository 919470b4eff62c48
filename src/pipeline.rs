//! Part lifecycle: add, extend, train, run and restore.
//!
//! Every operation takes the validated [`AppConfig`] by reference and the
//! image collaborators as trait objects, so tests can swap any of them.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::capture::{ImageSequenceSource, StopHandle};
use crate::config::AppConfig;
use crate::inference::{
    AnnotatedFrameWriter, Decision, FrameSink, InferenceError, InferenceSession, LiveSummary, run_live,
};
use crate::ml::plot::{PlotError, save_curves};
use crate::ml::{
    CheckpointError, DatasetError, FitOptions, ModelError, PairDataset, ReduceOnPlateau, SimilarityModel,
    TrainingError, TrainingLoop, TrainingReport, checkpoint, metrics,
};
use crate::part::store::save_image;
use crate::part::{FeatureError, FeaturePools, PartError, PartPaths, PartStore, PoolClass, read_box, write_box};
use crate::vision::{
    Augmenter, BorderContrastDetector, DescriptorExtractor, ExtractError, FeatureExtractor, ImageAugmenter,
    RoiDetector, embed_frame, equalize_clahe, open_rgb,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Part(#[from] PartError),
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Plot(#[from] PlotError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Part at {0} has no positive images")]
    NoPositiveImages(std::path::PathBuf),
}

/// Image-side collaborators used by the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn FeatureExtractor>,
    pub roi: Arc<dyn RoiDetector>,
    pub augmenter: Arc<dyn Augmenter>,
}

impl Collaborators {
    /// Built-in descriptor extractor, border-contrast detector and image
    /// augmenter.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            extractor: Arc::new(DescriptorExtractor::default()),
            roi: Arc::new(BorderContrastDetector::default()),
            augmenter: Arc::new(ImageAugmenter::new(config.augmentation.clone())),
        }
    }
}

/// Result of teaching or retraining a part.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub paths: PartPaths,
    pub report: TrainingReport,
}

fn equalized(image: &RgbImage, config: &AppConfig) -> RgbImage {
    if config.capture.equalize {
        equalize_clahe(image, config.capture.clip_limit, config.capture.tile_grid)
    } else {
        image.clone()
    }
}

/// Teach a new part from one snapshot, replacing any existing part of the
/// same name once the new one has finished training.
pub fn add_part(
    store: &PartStore,
    name: &str,
    snapshot: &RgbImage,
    config: &AppConfig,
    collaborators: &Collaborators,
) -> Result<TrainOutcome, PipelineError> {
    let staged = store.stage(name)?;
    let paths = staged.paths().clone();
    let snapshot = equalized(snapshot, config);
    save_image(&snapshot, &paths.snapshot())?;
    let bbox = collaborators.roi.detect(&snapshot);
    write_box(&paths.box_file(), bbox)?;
    match bbox {
        Some(b) => tracing::info!("Region of interest for {name:?}: {},{} -> {},{}", b.x1, b.y1, b.x2, b.y2),
        None => tracing::warn!("No region of interest found for {name:?}"),
    }

    build_features(&paths, config, collaborators)?;
    let report = train(&paths, config)?;
    let paths = store.commit(staged)?;
    Ok(TrainOutcome { paths, report })
}

/// Store an extra positive or negative image for an existing part.
pub fn add_extra(
    store: &PartStore,
    name: &str,
    class: PoolClass,
    image: &RgbImage,
    config: &AppConfig,
) -> Result<std::path::PathBuf, PipelineError> {
    Ok(store.add_extra(name, class, &equalized(image, config))?)
}

/// Regenerate features from the part's current images and retrain it.
pub fn retrain_part(
    store: &PartStore,
    name: &str,
    config: &AppConfig,
    collaborators: &Collaborators,
) -> Result<TrainOutcome, PipelineError> {
    let paths = store.existing(name)?;
    build_features(&paths, config, collaborators)?;
    let report = train(&paths, config)?;
    Ok(TrainOutcome { paths, report })
}

/// Swap a part with the version it replaced.
pub fn restore_part(store: &PartStore, name: &str) -> Result<PartPaths, PipelineError> {
    Ok(store.restore(name)?)
}

/// Generate `num_samples` augmented embeddings per class and save them with
/// the anchor embedding.
///
/// Positive variants cycle through every positive image. Negative variants
/// cycle through the negative images when the part has any; otherwise they
/// are synthesized from the snapshot.
pub fn build_features(
    paths: &PartPaths,
    config: &AppConfig,
    collaborators: &Collaborators,
) -> Result<FeaturePools, PipelineError> {
    let started = Instant::now();
    let snapshot = open_rgb(&paths.snapshot())?;
    let bbox = read_box(&paths.box_file())?;
    let extractor = collaborators.extractor.as_ref();
    let augmenter = collaborators.augmenter.as_ref();
    let anchor = embed_frame(extractor, &snapshot)?;

    let positive_images = load_class(paths, PoolClass::Positive)?;
    if positive_images.is_empty() {
        return Err(PipelineError::NoPositiveImages(paths.root.clone()));
    }
    let negative_images = load_class(paths, PoolClass::Negative)?;
    let samples = config.training.num_samples;
    let mut rng = StdRng::seed_from_u64(config.training.seed);

    let mut positive = Vec::with_capacity(samples);
    for idx in 0..samples {
        let source = &positive_images[idx % positive_images.len()];
        positive.push(embed_frame(extractor, &augmenter.positive(source, &mut rng))?);
    }
    let mut negative = Vec::with_capacity(samples);
    for idx in 0..samples {
        let variant = if negative_images.is_empty() {
            augmenter.negative(&snapshot, bbox, &mut rng)
        } else {
            augmenter.positive(&negative_images[idx % negative_images.len()], &mut rng)
        };
        negative.push(embed_frame(extractor, &variant)?);
    }

    let pools = FeaturePools::from_rows(anchor, &positive, &negative)?;
    pools.save(&paths.features_dir())?;
    tracing::info!(
        "Generated {} feature vectors ({} negative images on disk) in {:.2} minutes",
        2 * samples,
        negative_images.len(),
        started.elapsed().as_secs_f32() / 60.0
    );
    Ok(pools)
}

fn load_class(paths: &PartPaths, class: PoolClass) -> Result<Vec<RgbImage>, PipelineError> {
    paths
        .class_images(class)?
        .iter()
        .map(|path| open_rgb(path).map_err(PipelineError::from))
        .collect()
}

/// Train a fresh model on the part's saved features.
///
/// Writes the best checkpoint and the metrics log during training, then
/// the curve plot, and logs how the best checkpoint scores the validation
/// pairs.
pub fn train(paths: &PartPaths, config: &AppConfig) -> Result<TrainingReport, PipelineError> {
    let settings = &config.training;
    let pools = FeaturePools::load(&paths.features_dir())?;
    let (train_set, valid_set) =
        PairDataset::train_valid(&pools.anchor, pools.positive.view(), pools.negative.view(), settings.seed)?;

    let model = SimilarityModel::new(pools.dim(), settings.embed_size, settings.seed);
    let optimizer = model.optimizer(settings.learning_rate, settings.weight_decay);
    let options = FitOptions {
        epochs: settings.epochs,
        batch_size: settings.batch_size,
        margin: settings.margin,
        early_stopping: settings.early_stopping,
        seed: settings.seed,
        checkpoint_path: Some(paths.checkpoint()),
        metrics_path: Some(paths.metrics()),
    };
    let mut fit = TrainingLoop::new(model, optimizer, options);
    if let Some(plateau) = &settings.lr_plateau {
        fit = fit.with_scheduler(Box::new(ReduceOnPlateau::from(plateau)));
    }
    let report = fit.run(&train_set, &valid_set)?;

    if !report.history.is_empty() {
        save_curves(&paths.graphs(), &report.history)?;
    }
    if paths.checkpoint().is_file() {
        let best = checkpoint::load(&paths.checkpoint())?.into_model()?;
        let cm = metrics::evaluate(&best, &valid_set, 0.5)?;
        tracing::info!(
            "Best checkpoint on validation: accuracy {:.4}, precision {:.4}, recall {:.4}, f1 {:.4}",
            cm.accuracy(),
            cm.precision(),
            cm.recall(),
            cm.f1()
        );
    }
    Ok(report)
}

/// Load a trained part for scoring.
pub fn open_session(
    store: &PartStore,
    name: &str,
    config: &AppConfig,
    collaborators: &Collaborators,
) -> Result<InferenceSession, PipelineError> {
    let paths = store.existing(name)?;
    Ok(InferenceSession::load(
        &paths,
        &config.inference,
        &config.capture,
        Arc::clone(&collaborators.extractor),
    )?)
}

/// Discards frames; used when no output directory is requested.
struct DiscardFrames;

impl FrameSink for DiscardFrames {
    fn present(&mut self, _frame: &RgbImage, _decision: &Decision) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Run live inference for a part over a directory of frames, optionally
/// writing annotated frames to `out`.
pub fn run_part(
    store: &PartStore,
    name: &str,
    frames: &Path,
    out: Option<&Path>,
    config: &AppConfig,
    collaborators: &Collaborators,
    stop: &StopHandle,
) -> Result<LiveSummary, PipelineError> {
    let session = open_session(store, name, config, collaborators)?;
    let mut source = ImageSequenceSource::new(frames);
    let tick = Duration::from_millis(config.inference.tick_ms);
    let summary = match out {
        Some(dir) => {
            let mut writer = AnnotatedFrameWriter::create(dir)?;
            run_live(&session, &mut source, &mut writer, stop, tick)?
        }
        None => run_live(&session, &mut source, &mut DiscardFrames, stop, tick)?,
    };
    Ok(summary)
}
