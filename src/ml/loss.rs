//! Loss terms for the dual-objective similarity training.
//!
//! Batch functions return the mean loss together with its gradient with
//! respect to their input, already divided by the batch size.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Margin used for negative pairs unless configured otherwise.
pub const DEFAULT_MARGIN: f32 = 1.0;

/// Contrastive loss for a single pair of projections.
///
/// Positive pairs (`label = 1`) pay the squared distance; negative pairs pay
/// `max(0, margin - distance)^2`.
pub fn contrastive_pair(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>, label: f32, margin: f32) -> f32 {
    let squared: f32 = Zip::from(&a)
        .and(&b)
        .fold(0.0, |acc, &x, &y| acc + (x - y) * (x - y));
    let hinge = (margin - squared.sqrt()).max(0.0);
    label * squared + (1.0 - label) * hinge * hinge
}

/// Mean contrastive loss over a batch of projection pairs.
///
/// `diff` holds `proj_a - proj_b` row-wise. The returned gradient is with
/// respect to `diff`.
pub fn contrastive_batch(diff: ArrayView2<'_, f32>, labels: ArrayView1<'_, f32>, margin: f32) -> (f32, Array2<f32>) {
    let rows = diff.nrows();
    let mut grad = Array2::<f32>::zeros(diff.raw_dim());
    if rows == 0 {
        return (0.0, grad);
    }
    let scale = 1.0 / rows as f32;
    let mut total = 0.0f32;
    for ((row, mut grad_row), &label) in diff
        .axis_iter(Axis(0))
        .zip(grad.axis_iter_mut(Axis(0)))
        .zip(labels.iter())
    {
        let squared = row.dot(&row);
        let distance = squared.sqrt();
        let hinge = (margin - distance).max(0.0);
        total += label * squared + (1.0 - label) * hinge * hinge;

        // d/d(diff) of d^2 is 2*diff; of (m - d)^2 is -2(m - d) * diff / d.
        let mut coeff = 2.0 * label;
        if hinge > 0.0 && distance > f32::EPSILON {
            coeff -= 2.0 * (1.0 - label) * hinge / distance;
        }
        grad_row.assign(&(&row * (coeff * scale)));
    }
    (total * scale, grad)
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Mean binary cross-entropy computed directly from logits.
///
/// The gradient is with respect to the logits.
pub fn bce_with_logits(logits: ArrayView1<'_, f32>, labels: ArrayView1<'_, f32>) -> (f32, Array1<f32>) {
    let rows = logits.len();
    if rows == 0 {
        return (0.0, Array1::zeros(0));
    }
    let scale = 1.0 / rows as f32;
    let mut total = 0.0f32;
    let mut grad = Array1::<f32>::zeros(rows);
    Zip::from(&mut grad)
        .and(&logits)
        .and(&labels)
        .for_each(|g, &z, &y| {
            total += z.max(0.0) - z * y + (-z.abs()).exp().ln_1p();
            *g = (sigmoid(z) - y) * scale;
        });
    (total * scale, grad)
}

/// Share of logits whose thresholded sigmoid agrees with the label.
pub fn batch_accuracy(logits: ArrayView1<'_, f32>, labels: ArrayView1<'_, f32>) -> f32 {
    if logits.is_empty() {
        return 0.0;
    }
    let correct = Zip::from(&logits)
        .and(&labels)
        .fold(0usize, |acc, &z, &y| {
            let predicted = if sigmoid(z) > 0.5 { 1.0 } else { 0.0 };
            acc + usize::from(predicted == y)
        });
    correct as f32 / logits.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, arr1, arr2};

    #[test]
    fn identical_positive_pair_costs_nothing() {
        let a = arr1(&[0.3f32, -1.2, 4.0, 0.0]);
        assert_eq!(contrastive_pair(a.view(), a.view(), 1.0, DEFAULT_MARGIN), 0.0);
    }

    #[test]
    fn negative_pair_beyond_margin_costs_nothing() {
        let a = arr1(&[0.0f32, 0.0]);
        let b = arr1(&[0.0f32, 1.0]);
        assert_eq!(contrastive_pair(a.view(), b.view(), 0.0, 1.0), 0.0);
        let far = arr1(&[3.0f32, 4.0]);
        assert_eq!(contrastive_pair(a.view(), far.view(), 0.0, 1.0), 0.0);
    }

    #[test]
    fn negative_pair_inside_margin_pays_hinge() {
        let a = arr1(&[0.0f32, 0.0]);
        let b = arr1(&[0.3f32, 0.4]);
        let loss = contrastive_pair(a.view(), b.view(), 0.0, 1.0);
        assert!((loss - 0.25).abs() < 1e-6);
    }

    #[test]
    fn batch_loss_is_mean_of_pair_losses() {
        let diff = arr2(&[[0.3f32, 0.4], [1.0, 0.0], [0.0, 0.0]]);
        let labels = arr1(&[0.0f32, 1.0, 1.0]);
        let (loss, grad) = contrastive_batch(diff.view(), labels.view(), 1.0);
        assert!((loss - (0.25 + 1.0 + 0.0) / 3.0).abs() < 1e-6);
        // Positive row gradient is 2 * diff / batch.
        assert!((grad[[1, 0]] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(grad[[2, 0]], 0.0);
    }

    #[test]
    fn bce_matches_reference_values() {
        let logits = arr1(&[0.0f32, 2.0, -3.0]);
        let labels = arr1(&[1.0f32, 1.0, 0.0]);
        let (loss, grad) = bce_with_logits(logits.view(), labels.view());
        let expected = (2.0f32.ln() + (1.0 + (-2.0f32).exp()).ln() + (1.0 + (-3.0f32).exp()).ln()) / 3.0;
        assert!((loss - expected).abs() < 1e-5);
        assert!((grad[0] - (0.5 - 1.0) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn bce_is_stable_for_large_logits() {
        let logits = arr1(&[500.0f32, -500.0]);
        let labels = arr1(&[1.0f32, 0.0]);
        let (loss, _) = bce_with_logits(logits.view(), labels.view());
        assert!(loss.is_finite());
        assert!(loss < 1e-6);
    }

    #[test]
    fn accuracy_thresholds_at_half() {
        let logits = arr1(&[0.0f32, 0.1, -0.1, 5.0]);
        let labels = arr1(&[0.0f32, 1.0, 1.0, 1.0]);
        // sigmoid(0) == 0.5 predicts the negative class.
        assert!((batch_accuracy(logits.view(), labels.view()) - 0.75).abs() < 1e-6);
        assert_eq!(batch_accuracy(Array1::<f32>::zeros(0).view(), Array1::<f32>::zeros(0).view()), 0.0);
    }
}
