use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dataset::PairBatch;
use super::loss::sigmoid;
use super::optim::Adam;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Expected {expected}-dimensional input, got {actual}")]
    InputDimension { expected: usize, actual: usize },
    #[error("Weight tensor {name} has shape {actual:?}, expected {expected:?}")]
    WeightShape {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Learnable tensors of the similarity head.
///
/// The same layout is reused for gradients and optimizer moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    /// Projection matrix, `embed x input`.
    pub proj_w: Array2<f32>,
    pub proj_b: Array1<f32>,
    /// Classifier weights over `|proj_a - proj_b|`.
    pub head_w: Array1<f32>,
    /// Classifier bias, stored as a one-element vector.
    pub head_b: Array1<f32>,
}

impl SimilarityWeights {
    pub fn zeros(input_dim: usize, embed_dim: usize) -> Self {
        Self {
            proj_w: Array2::zeros((embed_dim, input_dim)),
            proj_b: Array1::zeros(embed_dim),
            head_w: Array1::zeros(embed_dim),
            head_b: Array1::zeros(1),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.input_dim(), self.embed_dim())
    }

    pub fn input_dim(&self) -> usize {
        self.proj_w.ncols()
    }

    pub fn embed_dim(&self) -> usize {
        self.proj_w.nrows()
    }

    fn validate(&self) -> Result<(), ModelError> {
        let embed = self.embed_dim();
        check_shape("proj_b", self.proj_b.shape(), &[embed])?;
        check_shape("head_w", self.head_w.shape(), &[embed])?;
        check_shape("head_b", self.head_b.shape(), &[1])
    }
}

fn check_shape(name: &'static str, actual: &[usize], expected: &[usize]) -> Result<(), ModelError> {
    if actual == expected {
        return Ok(());
    }
    Err(ModelError::WeightShape {
        name,
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    })
}

/// Siamese similarity head over pairs of embeddings.
///
/// Both inputs share one ReLU projection; the classifier scores the
/// element-wise absolute difference of the two projections.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityModel {
    weights: SimilarityWeights,
}

/// Intermediate activations kept for the backward pass.
#[derive(Debug)]
pub(crate) struct ForwardPass {
    pre_a: Array2<f32>,
    pre_b: Array2<f32>,
    /// `proj_a - proj_b`, one row per pair.
    pub diff: Array2<f32>,
    pub logits: Array1<f32>,
}

impl SimilarityModel {
    /// Create a model with uniform `±1/sqrt(fan_in)` initialization.
    pub fn new(input_dim: usize, embed_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut weights = SimilarityWeights::zeros(input_dim, embed_dim);
        let proj_bound = 1.0 / (input_dim.max(1) as f32).sqrt();
        let head_bound = 1.0 / (embed_dim.max(1) as f32).sqrt();
        weights
            .proj_w
            .mapv_inplace(|_| rng.random_range(-proj_bound..=proj_bound));
        weights
            .proj_b
            .mapv_inplace(|_| rng.random_range(-proj_bound..=proj_bound));
        weights
            .head_w
            .mapv_inplace(|_| rng.random_range(-head_bound..=head_bound));
        weights
            .head_b
            .mapv_inplace(|_| rng.random_range(-head_bound..=head_bound));
        Self { weights }
    }

    /// Wrap previously trained weights after checking their shapes.
    pub fn from_weights(weights: SimilarityWeights) -> Result<Self, ModelError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &SimilarityWeights {
        &self.weights
    }

    pub(crate) fn weights_mut(&mut self) -> &mut SimilarityWeights {
        &mut self.weights
    }

    pub fn input_dim(&self) -> usize {
        self.weights.input_dim()
    }

    pub fn embed_dim(&self) -> usize {
        self.weights.embed_dim()
    }

    /// Build an Adam optimizer over this model's parameters.
    pub fn optimizer(&self, learning_rate: f32, weight_decay: f32) -> Adam {
        Adam::new(&self.weights, learning_rate, weight_decay)
    }

    /// Project both embeddings into the contrastive space.
    pub fn embed_pair(
        &self,
        a: ArrayView1<'_, f32>,
        b: ArrayView1<'_, f32>,
    ) -> Result<(Array1<f32>, Array1<f32>), ModelError> {
        self.check_input(a.len())?;
        self.check_input(b.len())?;
        Ok((self.project(a), self.project(b)))
    }

    /// Match logit for a pair of embeddings.
    pub fn classify_pair(&self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> Result<f32, ModelError> {
        let (proj_a, proj_b) = self.embed_pair(a, b)?;
        let abs_diff = (&proj_a - &proj_b).mapv(f32::abs);
        Ok(abs_diff.dot(&self.weights.head_w) + self.weights.head_b[0])
    }

    /// Match probability for a pair of embeddings.
    pub fn probability(&self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> Result<f32, ModelError> {
        self.classify_pair(a, b).map(sigmoid)
    }

    fn check_input(&self, actual: usize) -> Result<(), ModelError> {
        let expected = self.input_dim();
        if actual != expected {
            return Err(ModelError::InputDimension { expected, actual });
        }
        Ok(())
    }

    fn project(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        (self.weights.proj_w.dot(&x) + &self.weights.proj_b).mapv(relu)
    }

    pub(crate) fn forward(&self, batch: &PairBatch) -> ForwardPass {
        let w_t = self.weights.proj_w.t();
        let pre_a = batch.anchors.dot(&w_t) + &self.weights.proj_b;
        let pre_b = batch.candidates.dot(&w_t) + &self.weights.proj_b;
        let diff = pre_a.mapv(relu) - pre_b.mapv(relu);
        let logits = diff.mapv(f32::abs).dot(&self.weights.head_w) + self.weights.head_b[0];
        ForwardPass {
            pre_a,
            pre_b,
            diff,
            logits,
        }
    }

    /// Gradients of the combined loss given its partial derivatives with
    /// respect to `diff` (contrastive term) and the logits (BCE term).
    pub(crate) fn backward(
        &self,
        batch: &PairBatch,
        pass: &ForwardPass,
        grad_diff: &Array2<f32>,
        grad_logits: &Array1<f32>,
    ) -> SimilarityWeights {
        let signs = pass.diff.mapv(sign);
        let abs_diff = pass.diff.mapv(f32::abs);

        let head_w = abs_diff.t().dot(grad_logits);
        let head_b = Array1::from_elem(1, grad_logits.sum());

        let through_head = &grad_logits.view().insert_axis(Axis(1))
            * &self.weights.head_w.view().insert_axis(Axis(0))
            * &signs;
        let total_diff = grad_diff + &through_head;

        let mut grad_pre_a = total_diff.clone();
        Zip::from(&mut grad_pre_a)
            .and(&pass.pre_a)
            .for_each(|g, &pre| {
                if pre <= 0.0 {
                    *g = 0.0;
                }
            });
        let mut grad_pre_b = total_diff.mapv(|g| -g);
        Zip::from(&mut grad_pre_b)
            .and(&pass.pre_b)
            .for_each(|g, &pre| {
                if pre <= 0.0 {
                    *g = 0.0;
                }
            });

        let proj_w = grad_pre_a.t().dot(&batch.anchors) + grad_pre_b.t().dot(&batch.candidates);
        let proj_b = grad_pre_a.sum_axis(Axis(0)) + grad_pre_b.sum_axis(Axis(0));

        SimilarityWeights {
            proj_w,
            proj_b,
            head_w,
            head_b,
        }
    }
}

fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Sign with `sign(0) = 0`, the subgradient used for `|x|`.
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::loss::{bce_with_logits, contrastive_batch};
    use ndarray::{arr1, arr2};

    fn combined_loss(model: &SimilarityModel, batch: &PairBatch, margin: f32) -> f32 {
        let pass = model.forward(batch);
        let (contrastive, _) = contrastive_batch(pass.diff.view(), batch.labels.view(), margin);
        let (bce, _) = bce_with_logits(pass.logits.view(), batch.labels.view());
        contrastive + bce
    }

    fn sample_batch() -> PairBatch {
        PairBatch {
            anchors: arr2(&[[0.5f32, -0.2, 0.9], [0.5, -0.2, 0.9], [0.5, -0.2, 0.9]]),
            candidates: arr2(&[[0.4f32, -0.1, 0.7], [-0.8, 0.6, 0.1], [0.9, 0.3, -0.5]]),
            labels: arr1(&[1.0f32, 0.0, 0.0]),
        }
    }

    #[test]
    fn single_pair_ops_match_batched_forward() {
        let model = SimilarityModel::new(3, 4, 7);
        let batch = sample_batch();
        let pass = model.forward(&batch);
        for row in 0..batch.len() {
            let logit = model
                .classify_pair(batch.anchors.row(row), batch.candidates.row(row))
                .unwrap();
            assert!((logit - pass.logits[row]).abs() < 1e-5);
            let (a, b) = model
                .embed_pair(batch.anchors.row(row), batch.candidates.row(row))
                .unwrap();
            let diff = &a - &b;
            for (x, y) in diff.iter().zip(pass.diff.row(row).iter()) {
                assert!((x - y).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn identical_inputs_give_zero_projection_distance() {
        let model = SimilarityModel::new(3, 5, 1);
        let x = arr1(&[0.1f32, 0.2, 0.3]);
        let (a, b) = model.embed_pair(x.view(), x.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_input_length_is_rejected() {
        let model = SimilarityModel::new(3, 2, 0);
        let a = arr1(&[0.0f32; 3]);
        let b = arr1(&[0.0f32; 4]);
        assert_eq!(
            model.probability(a.view(), b.view()),
            Err(ModelError::InputDimension {
                expected: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn backward_matches_finite_differences() {
        let model = SimilarityModel::new(3, 4, 11);
        let batch = sample_batch();
        let margin = 1.0;
        let pass = model.forward(&batch);
        let (_, grad_diff) = contrastive_batch(pass.diff.view(), batch.labels.view(), margin);
        let (_, grad_logits) = bce_with_logits(pass.logits.view(), batch.labels.view());
        let grads = model.backward(&batch, &pass, &grad_diff, &grad_logits);

        let eps = 1e-3f32;
        let finite_diff = |mutate: &dyn Fn(&mut SimilarityWeights, f32)| {
            let mut plus = model.clone();
            mutate(plus.weights_mut(), eps);
            let mut minus = model.clone();
            mutate(minus.weights_mut(), -eps);
            (combined_loss(&plus, &batch, margin) - combined_loss(&minus, &batch, margin)) / (2.0 * eps)
        };

        for row in 0..4 {
            for col in 0..3 {
                let numeric = finite_diff(&|w: &mut SimilarityWeights, d: f32| w.proj_w[[row, col]] += d);
                assert!(
                    (numeric - grads.proj_w[[row, col]]).abs() < 2e-2,
                    "proj_w[{row},{col}] numeric={numeric} analytic={}",
                    grads.proj_w[[row, col]]
                );
            }
            let numeric = finite_diff(&|w: &mut SimilarityWeights, d: f32| w.head_w[row] += d);
            assert!((numeric - grads.head_w[row]).abs() < 2e-2);
        }
        let numeric = finite_diff(&|w: &mut SimilarityWeights, d: f32| w.head_b[0] += d);
        assert!((numeric - grads.head_b[0]).abs() < 2e-2);
    }

    #[test]
    fn from_weights_rejects_mismatched_bias() {
        let mut weights = SimilarityWeights::zeros(3, 2);
        weights.proj_b = Array1::zeros(5);
        assert!(matches!(
            SimilarityModel::from_weights(weights),
            Err(ModelError::WeightShape { name: "proj_b", .. })
        ));
    }
}
