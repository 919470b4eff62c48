//! Fixed-length feature vectors produced by a feature extractor.

use std::sync::Arc;

use ndarray::ArrayView1;

/// Immutable embedding vector.
///
/// Cloning is cheap: the values are shared, which lets one anchor embedding
/// back every training pair built for a part.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Arc<[f32]>,
}

impl Embedding {
    /// Wrap raw values without normalization.
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Build an embedding scaled to unit L2 norm.
    ///
    /// All-zero or non-finite inputs are kept as-is.
    pub fn normalized(mut values: Vec<f32>) -> Self {
        normalize_l2_in_place(&mut values);
        Self::new(values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.values[..])
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Normalize a vector in-place and return whether the norm was non-zero.
pub fn normalize_l2_in_place(values: &mut [f32]) -> bool {
    let sum: f32 = values.iter().map(|v| v * v).sum();
    if !sum.is_finite() || sum <= 0.0 {
        return false;
    }
    let norm = sum.sqrt();
    for value in values {
        *value /= norm;
    }
    true
}
