//! Evaluation metrics for the pair classifier.

use super::dataset::PairDataset;
use super::model::{ModelError, SimilarityModel};

/// Binary confusion counts at a fixed probability threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positive: u32,
    pub false_positive: u32,
    pub true_negative: u32,
    pub false_negative: u32,
}

impl ConfusionMatrix {
    pub fn add(&mut self, truth: bool, predicted: bool) {
        let slot = match (truth, predicted) {
            (true, true) => &mut self.true_positive,
            (false, true) => &mut self.false_positive,
            (false, false) => &mut self.true_negative,
            (true, false) => &mut self.false_negative,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// `TP / (TP + FP)`, zero when nothing was predicted positive.
    pub fn precision(&self) -> f32 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// `TP / (TP + FN)`.
    pub fn recall(&self) -> f32 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f32 {
        let (p, r) = (self.precision(), self.recall());
        if p + r <= 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn accuracy(&self) -> f32 {
        ratio(self.true_positive + self.true_negative, self.total())
    }
}

fn ratio(num: u32, denom: u32) -> f32 {
    if denom == 0 { 0.0 } else { num as f32 / denom as f32 }
}

/// Score every pair in `dataset` and count outcomes at `threshold`.
pub fn evaluate(model: &SimilarityModel, dataset: &PairDataset, threshold: f32) -> Result<ConfusionMatrix, ModelError> {
    let mut matrix = ConfusionMatrix::default();
    for idx in 0..dataset.len() {
        let Some(sample) = dataset.get(idx) else {
            continue;
        };
        let probability = model.probability(sample.anchor, sample.candidate)?;
        matrix.add(sample.label.as_f32() > 0.5, probability >= threshold);
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use ndarray::Array2;

    #[test]
    fn precision_recall_from_counts() {
        let mut cm = ConfusionMatrix::default();
        for _ in 0..3 {
            cm.add(true, true);
        }
        cm.add(false, true);
        cm.add(true, false);
        cm.add(false, false);
        assert_eq!(cm.total(), 6);
        assert!((cm.precision() - 0.75).abs() < 1e-6);
        assert!((cm.recall() - 0.75).abs() < 1e-6);
        assert!((cm.f1() - 0.75).abs() < 1e-6);
        assert!((cm.accuracy() - 4.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn empty_matrix_reports_zeroes() {
        let cm = ConfusionMatrix::default();
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.f1(), 0.0);
    }

    #[test]
    fn evaluate_counts_every_pair() {
        let anchor = Embedding::new(vec![1.0, 0.0]);
        let dataset = PairDataset::new(anchor, Array2::ones((3, 2)), Array2::zeros((2, 2))).unwrap();
        let model = SimilarityModel::new(2, 4, 0);
        let cm = evaluate(&model, &dataset, 0.5).unwrap();
        assert_eq!(cm.total(), 5);
        assert_eq!(cm.true_positive + cm.false_negative, 3);
    }
}
