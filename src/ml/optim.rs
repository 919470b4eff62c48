use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

use super::model::SimilarityWeights;

/// Adam optimizer with L2 weight decay folded into the gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    weight_decay: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: u64,
    first_moment: SimilarityWeights,
    second_moment: SimilarityWeights,
}

#[derive(Clone, Copy)]
struct StepParams {
    learning_rate: f32,
    weight_decay: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    bias1: f32,
    bias2: f32,
}

impl Adam {
    pub fn new(weights: &SimilarityWeights, learning_rate: f32, weight_decay: f32) -> Self {
        Self {
            learning_rate,
            weight_decay,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moment: weights.zeros_like(),
            second_moment: weights.zeros_like(),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Whether the moment buffers fit `weights`.
    pub fn matches(&self, weights: &SimilarityWeights) -> bool {
        self.first_moment.proj_w.dim() == weights.proj_w.dim()
            && self.second_moment.proj_w.dim() == weights.proj_w.dim()
    }

    /// Apply one update to `weights` from `grads`.
    pub fn step(&mut self, weights: &mut SimilarityWeights, grads: &SimilarityWeights) {
        self.step += 1;
        let t = self.step as i32;
        let params = StepParams {
            learning_rate: self.learning_rate,
            weight_decay: self.weight_decay,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias1: 1.0 - self.beta1.powi(t),
            bias2: 1.0 - self.beta2.powi(t),
        };
        let m = &mut self.first_moment;
        let v = &mut self.second_moment;
        update(&mut weights.proj_w, &grads.proj_w, &mut m.proj_w, &mut v.proj_w, params);
        update(&mut weights.proj_b, &grads.proj_b, &mut m.proj_b, &mut v.proj_b, params);
        update(&mut weights.head_w, &grads.head_w, &mut m.head_w, &mut v.head_w, params);
        update(&mut weights.head_b, &grads.head_b, &mut m.head_b, &mut v.head_b, params);
    }
}

fn update<D: Dimension>(
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    p: StepParams,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|w, &g, m, v| {
            let g = g + p.weight_decay * *w;
            *m = p.beta1 * *m + (1.0 - p.beta1) * g;
            *v = p.beta2 * *v + (1.0 - p.beta2) * g * g;
            let m_hat = *m / p.bias1;
            let v_hat = *v / p.bias2;
            *w -= p.learning_rate * m_hat / (v_hat.sqrt() + p.epsilon);
        });
}
