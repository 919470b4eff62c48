//! Anchor/candidate pair datasets and the k-fold train/validation split.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::embedding::Embedding;

/// Number of folds used to carve the validation split.
pub const DEFAULT_FOLDS: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    #[error("Cannot split {rows} rows into {folds} folds")]
    TooFewRows { rows: usize, folds: usize },
    #[error("Pool row length {actual} does not match anchor length {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Split index {index} is out of range for a pool of {rows} rows")]
    IndexOutOfRange { index: usize, rows: usize },
}

/// Pair label, fixed by the pool a candidate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    pub fn as_f32(self) -> f32 {
        match self {
            Label::Negative => 0.0,
            Label::Positive => 1.0,
        }
    }
}

/// Disjoint row indices used for training and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Shuffled k-fold split over `rows`, keeping only the first fold as the
/// validation set.
///
/// Fold sizes follow the usual rule: every fold holds `rows / folds` rows
/// and the first `rows % folds` folds hold one extra. Both index lists are
/// returned sorted.
pub fn first_fold(rows: usize, folds: usize, seed: u64) -> Result<FoldSplit, DatasetError> {
    if folds < 2 || rows < folds {
        return Err(DatasetError::TooFewRows { rows, folds });
    }
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let valid_len = rows / folds + usize::from(rows % folds > 0);
    let mut valid = order[..valid_len].to_vec();
    let mut train = order[valid_len..].to_vec();
    valid.sort_unstable();
    train.sort_unstable();
    Ok(FoldSplit { train, valid })
}

/// Split sized by the smaller pool so both classes stay balanced.
///
/// The same indices select rows from both pools; rows of the larger pool
/// past the smaller pool's length are never used.
pub fn balanced_split(positive_rows: usize, negative_rows: usize, seed: u64) -> Result<FoldSplit, DatasetError> {
    first_fold(positive_rows.min(negative_rows), DEFAULT_FOLDS, seed)
}

/// One labeled pair borrowed from a [`PairDataset`].
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub anchor: ArrayView1<'a, f32>,
    pub candidate: ArrayView1<'a, f32>,
    pub label: Label,
}

/// Row-stacked pairs fed to the model in one step.
#[derive(Debug, Clone)]
pub struct PairBatch {
    pub anchors: Array2<f32>,
    pub candidates: Array2<f32>,
    pub labels: Array1<f32>,
}

impl PairBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Pairs of one shared anchor with every selected pool row.
///
/// Indices `0..positives` address positive rows, the rest negative rows.
#[derive(Debug, Clone)]
pub struct PairDataset {
    anchor: Embedding,
    positive: Array2<f32>,
    negative: Array2<f32>,
}

impl PairDataset {
    pub fn new(anchor: Embedding, positive: Array2<f32>, negative: Array2<f32>) -> Result<Self, DatasetError> {
        for pool in [&positive, &negative] {
            if pool.nrows() > 0 && pool.ncols() != anchor.len() {
                return Err(DatasetError::DimensionMismatch {
                    expected: anchor.len(),
                    actual: pool.ncols(),
                });
            }
        }
        Ok(Self {
            anchor,
            positive,
            negative,
        })
    }

    /// Build a dataset from the rows of each pool listed in `indices`.
    pub fn select(
        anchor: &Embedding,
        positive: ArrayView2<'_, f32>,
        negative: ArrayView2<'_, f32>,
        indices: &[usize],
    ) -> Result<Self, DatasetError> {
        let rows = positive.nrows().min(negative.nrows());
        if let Some(&index) = indices.iter().find(|&&index| index >= rows) {
            return Err(DatasetError::IndexOutOfRange { index, rows });
        }
        Self::new(
            anchor.clone(),
            positive.select(Axis(0), indices),
            negative.select(Axis(0), indices),
        )
    }

    /// Train and validation datasets from the balanced first-fold split.
    pub fn train_valid(
        anchor: &Embedding,
        positive: ArrayView2<'_, f32>,
        negative: ArrayView2<'_, f32>,
        seed: u64,
    ) -> Result<(Self, Self), DatasetError> {
        let split = balanced_split(positive.nrows(), negative.nrows(), seed)?;
        tracing::debug!(
            "Split {} positive / {} negative rows into {} train and {} valid indices",
            positive.nrows(),
            negative.nrows(),
            split.train.len(),
            split.valid.len()
        );
        let train = Self::select(anchor, positive, negative, &split.train)?;
        let valid = Self::select(anchor, positive, negative, &split.valid)?;
        Ok((train, valid))
    }

    pub fn len(&self) -> usize {
        self.positive.nrows() + self.negative.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.anchor.len()
    }

    pub fn anchor(&self) -> &Embedding {
        &self.anchor
    }

    pub fn get(&self, index: usize) -> Option<Sample<'_>> {
        let positives = self.positive.nrows();
        let (candidate, label) = if index < positives {
            (self.positive.row(index), Label::Positive)
        } else if index < self.len() {
            (self.negative.row(index - positives), Label::Negative)
        } else {
            return None;
        };
        Some(Sample {
            anchor: self.anchor.view(),
            candidate,
            label,
        })
    }

    /// Visit order for one pass: shuffled when `rng` is given.
    pub fn order(&self, rng: Option<&mut StdRng>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order
    }

    /// Stack the pairs at `indices` into one batch. Unknown indices are skipped.
    pub fn batch(&self, indices: &[usize]) -> PairBatch {
        let dim = self.dim();
        let samples: Vec<Sample<'_>> = indices.iter().filter_map(|&idx| self.get(idx)).collect();
        let mut anchors = Array2::<f32>::zeros((samples.len(), dim));
        let mut candidates = Array2::<f32>::zeros((samples.len(), dim));
        let mut labels = Array1::<f32>::zeros(samples.len());
        for (row, sample) in samples.iter().enumerate() {
            anchors.row_mut(row).assign(&sample.anchor);
            candidates.row_mut(row).assign(&sample.candidate);
            labels[row] = sample.label.as_f32();
        }
        PairBatch {
            anchors,
            candidates,
            labels,
        }
    }
}
