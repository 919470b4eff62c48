use std::borrow::Cow;
use std::sync::Arc;

use image::RgbImage;

use super::InferenceError;
use super::decision::{Decision, decide};
use super::overlay::{blend_anchor, render};
use crate::config::{CaptureSettings, InferenceSettings};
use crate::embedding::Embedding;
use crate::ml::{SimilarityModel, checkpoint};
use crate::part::{FeaturePools, PartPaths, read_box};
use crate::vision::{BoundingBox, FeatureExtractor, embed_frame, equalize_clahe, open_rgb};

/// A trained part ready to score frames.
///
/// Everything is loaded once up front; scoring a frame costs one feature
/// extraction and one forward pass. Frames get the same contrast
/// equalization as the images the part was taught from.
pub struct InferenceSession {
    model: SimilarityModel,
    anchor: Embedding,
    bbox: Option<BoundingBox>,
    anchor_image: Option<RgbImage>,
    settings: InferenceSettings,
    equalization: Option<CaptureSettings>,
    extractor: Arc<dyn FeatureExtractor>,
}

/// One processed frame.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub decision: Decision,
}

impl InferenceSession {
    pub fn new(
        model: SimilarityModel,
        anchor: Embedding,
        bbox: Option<BoundingBox>,
        settings: InferenceSettings,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Self, InferenceError> {
        let expected = model.input_dim();
        for actual in [anchor.len(), extractor.dim()] {
            if actual != expected {
                return Err(InferenceError::DimensionMismatch { expected, actual });
            }
        }
        Ok(Self {
            model,
            anchor,
            bbox,
            anchor_image: None,
            settings,
            equalization: None,
            extractor,
        })
    }

    /// Load the checkpoint, anchor embedding and box record of a part.
    pub fn load(
        paths: &PartPaths,
        settings: &InferenceSettings,
        capture: &CaptureSettings,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Self, InferenceError> {
        let model = checkpoint::load(&paths.checkpoint())?.into_model()?;
        let pools = FeaturePools::load(&paths.features_dir())?;
        let bbox = read_box(&paths.box_file())?;
        let mut session =
            Self::new(model, pools.anchor, bbox, settings.clone(), extractor)?.with_equalization(capture);
        if settings.anchor_alpha > 0.0 {
            match open_rgb(&paths.snapshot()) {
                Ok(image) => session.anchor_image = Some(image),
                Err(err) => tracing::warn!("Anchor blend disabled: {err}"),
            }
        }
        tracing::info!(
            "Loaded part at {} (box: {})",
            paths.root.display(),
            crate::part::format_box(bbox)
        );
        Ok(session)
    }

    pub fn with_anchor_image(mut self, image: RgbImage) -> Self {
        self.anchor_image = Some(image);
        self
    }

    /// Equalize frames before scoring when `capture.equalize` is set.
    pub fn with_equalization(mut self, capture: &CaptureSettings) -> Self {
        self.equalization = capture.equalize.then(|| capture.clone());
        self
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    fn prepare<'a>(&self, frame: &'a RgbImage) -> Cow<'a, RgbImage> {
        match &self.equalization {
            Some(capture) => Cow::Owned(equalize_clahe(frame, capture.clip_limit, capture.tile_grid)),
            None => Cow::Borrowed(frame),
        }
    }

    /// Embedding of `frame` as the model sees it.
    pub fn embed(&self, frame: &RgbImage) -> Result<Embedding, InferenceError> {
        Ok(embed_frame(self.extractor.as_ref(), &self.prepare(frame))?)
    }

    fn score_prepared(&self, frame: &RgbImage) -> Result<f32, InferenceError> {
        let embedding = embed_frame(self.extractor.as_ref(), frame)?;
        Ok(self.model.probability(self.anchor.view(), embedding.view())?)
    }

    /// Match probability of `frame` against the anchor.
    pub fn score(&self, frame: &RgbImage) -> Result<f32, InferenceError> {
        self.score_prepared(&self.prepare(frame))
    }

    pub fn decide(&self, frame: &RgbImage) -> Result<Decision, InferenceError> {
        let probability = self.score(frame)?;
        Ok(decide(probability, self.bbox, &self.settings))
    }

    /// Score `frame` and return an annotated copy of the equalized frame.
    pub fn annotate(&self, frame: &RgbImage) -> Result<AnnotatedFrame, InferenceError> {
        let mut image = self.prepare(frame).into_owned();
        let probability = self.score_prepared(&image)?;
        let decision = decide(probability, self.bbox, &self.settings);
        if let Some(anchor) = &self.anchor_image {
            blend_anchor(&mut image, anchor, self.settings.anchor_alpha);
        }
        render(&mut image, &decision.render);
        Ok(AnnotatedFrame { image, decision })
    }
}
