use ndarray::{Array2, ArrayView2, Zip};
use std::fmt;
use std::sync::Arc;

use super::ObjectiveKind;
use crate::model::ModelError;
use crate::utils::{argmax_rows, labeled_rows, select_rows};

/// Clamp applied to probabilities before taking logs
const PROB_EPS: f32 = 1e-7;

/// Caller-supplied cost: `(prediction, target) -> (cost, d_cost/d_prediction)`
pub type CostFn = dyn Fn(ArrayView2<f32>, ArrayView2<f32>) -> (f32, Array2<f32>) + Send + Sync;

/// Result of scoring one batch
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Value minimised by training
    pub cost: f32,
    /// Tracked metric; NaN when undefined for the batch
    pub error: f32,
    /// Gradient of `cost` w.r.t. the prediction
    pub grad: Array2<f32>,
}

/// Maps a prediction and its target to a cost, an error metric and the
/// gradient needed for backpropagation.
///
/// Cross-entropy variants only look at labeled rows (rows of the target with
/// any non-zero entry); their error is the misclassification rate on those
/// rows.
#[derive(Clone)]
pub enum Objective {
    Mse,
    BinaryCrossEntropy,
    CrossEntropy,
    /// Error is not tracked and always reported as zero
    Custom(Arc<CostFn>),
}

impl fmt::Debug for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Mse => write!(f, "Mse"),
            Objective::BinaryCrossEntropy => write!(f, "BinaryCrossEntropy"),
            Objective::CrossEntropy => write!(f, "CrossEntropy"),
            Objective::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl From<ObjectiveKind> for Objective {
    fn from(kind: ObjectiveKind) -> Self {
        match kind {
            ObjectiveKind::Mse => Objective::Mse,
            ObjectiveKind::BinaryCrossEntropy => Objective::BinaryCrossEntropy,
            ObjectiveKind::CrossEntropy => Objective::CrossEntropy,
        }
    }
}

impl Objective {
    pub fn custom<F>(cost: F) -> Self
    where
        F: Fn(ArrayView2<f32>, ArrayView2<f32>) -> (f32, Array2<f32>) + Send + Sync + 'static,
    {
        Objective::Custom(Arc::new(cost))
    }

    pub fn evaluate(
        &self,
        prediction: ArrayView2<f32>,
        target: ArrayView2<f32>,
    ) -> Result<Evaluation, ModelError> {
        if prediction.dim() != target.dim() {
            return Err(ModelError::DimensionMismatch(format!(
                "prediction {:?} vs target {:?}",
                prediction.dim(),
                target.dim()
            )));
        }

        match self {
            Objective::Mse => Ok(mse(prediction, target)),
            Objective::BinaryCrossEntropy => Ok(labeled_only(prediction, target, binary_cross_entropy)),
            Objective::CrossEntropy => Ok(labeled_only(prediction, target, categorical_cross_entropy)),
            Objective::Custom(cost_fn) => {
                let (cost, grad) = cost_fn(prediction, target);
                if grad.dim() != prediction.dim() {
                    return Err(ModelError::DimensionMismatch(format!(
                        "custom cost returned gradient {:?} for prediction {:?}",
                        grad.dim(),
                        prediction.dim()
                    )));
                }
                Ok(Evaluation { cost, error: 0.0, grad })
            }
        }
    }
}

fn mse(prediction: ArrayView2<f32>, target: ArrayView2<f32>) -> Evaluation {
    let diff = &prediction - &target;
    let n = diff.len().max(1) as f32;
    let cost = diff.iter().map(|d| d * d).sum::<f32>() / n;
    let grad = diff.mapv(|d| 2.0 * d / n);
    Evaluation { cost, error: cost, grad }
}

/// Restricts a cross-entropy cost to labeled rows and scatters its gradient
/// back into a full-size array (zero on unlabeled rows).
fn labeled_only(
    prediction: ArrayView2<f32>,
    target: ArrayView2<f32>,
    cost: fn(ArrayView2<f32>, ArrayView2<f32>) -> (f32, Array2<f32>),
) -> Evaluation {
    let mut grad = Array2::zeros(prediction.dim());
    let rows = labeled_rows(target);
    if rows.is_empty() {
        return Evaluation { cost: 0.0, error: f32::NAN, grad };
    }

    let p = select_rows(prediction, &rows);
    let y = select_rows(target, &rows);
    let (value, labeled_grad) = cost(p.view(), y.view());

    for (src, &row) in labeled_grad.outer_iter().zip(&rows) {
        grad.row_mut(row).assign(&src);
    }

    let predicted = argmax_rows(p.view());
    let actual = argmax_rows(y.view());
    let wrong = predicted.iter().zip(actual.iter()).filter(|(a, b)| a != b).count();

    Evaluation {
        cost: value,
        error: wrong as f32 / rows.len() as f32,
        grad,
    }
}

fn categorical_cross_entropy(p: ArrayView2<f32>, y: ArrayView2<f32>) -> (f32, Array2<f32>) {
    let n = p.nrows() as f32;
    let clamped = p.mapv(|v| v.max(PROB_EPS));
    let cost = -Zip::from(&clamped)
        .and(&y)
        .fold(0.0f32, |acc, &pv, &yv| acc + yv * pv.ln())
        / n;
    // the cost is flat where the clamp is active
    let grad = Zip::from(&p)
        .and(&y)
        .map_collect(|&pv, &yv| if pv < PROB_EPS { 0.0 } else { -yv / pv / n });
    (cost, grad)
}

fn binary_cross_entropy(p: ArrayView2<f32>, y: ArrayView2<f32>) -> (f32, Array2<f32>) {
    let n = p.len() as f32;
    let clamped = p.mapv(|v| v.clamp(PROB_EPS, 1.0 - PROB_EPS));
    let cost = -Zip::from(&clamped)
        .and(&y)
        .fold(0.0f32, |acc, &pv, &yv| {
            acc + yv * pv.ln() + (1.0 - yv) * (1.0 - pv).ln()
        })
        / n;
    let grad = Zip::from(&p)
        .and(&y)
        .map_collect(|&pv, &yv| {
            if pv < PROB_EPS || pv > 1.0 - PROB_EPS {
                0.0
            } else {
                (pv - yv) / (pv * (1.0 - pv)) / n
            }
        });
    (cost, grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_mse_cost_equals_error_bitwise() {
        let pred = array![[0.3, -1.2, 4.0], [0.1, 0.0, 2.5]];
        let target = array![[0.0, 1.0, 3.0], [0.7, -0.3, 2.0]];

        let eval = Objective::Mse.evaluate(pred.view(), target.view()).unwrap();
        assert_eq!(eval.cost.to_bits(), eval.error.to_bits());

        let expected = [0.09f32, 4.84, 1.0, 0.36, 0.09, 0.25].iter().sum::<f32>() / 6.0;
        assert_abs_diff_eq!(eval.cost, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_mse_gradient() {
        let pred = array![[1.0, 2.0]];
        let target = array![[0.0, 2.0]];
        let eval = Objective::Mse.evaluate(pred.view(), target.view()).unwrap();
        // d/dp mean((p - y)^2) = 2 (p - y) / n
        assert_abs_diff_eq!(eval.grad[[0, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(eval.grad[[0, 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_ignores_unlabeled_rows() {
        let pred = array![[0.7, 0.2, 0.1], [0.1, 0.1, 0.8], [0.3, 0.3, 0.4]];
        let target = array![[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

        let eval = Objective::CrossEntropy.evaluate(pred.view(), target.view()).unwrap();

        let expected = -(0.7f32.ln() + 0.3f32.ln()) / 2.0;
        assert_abs_diff_eq!(eval.cost, expected, epsilon = 1e-5);
        // row 0 correct, row 2 predicts class 2 instead of 1
        assert_abs_diff_eq!(eval.error, 0.5, epsilon = 1e-6);
        assert!(eval.grad.row(1).iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_all_unlabeled_batch_has_nan_error_and_finite_cost() {
        let pred = array![[0.5, 0.5], [0.9, 0.1]];
        let target = Array2::<f32>::zeros((2, 2));

        for objective in [Objective::CrossEntropy, Objective::BinaryCrossEntropy] {
            let eval = objective.evaluate(pred.view(), target.view()).unwrap();
            assert!(eval.error.is_nan());
            assert!(eval.cost.is_finite());
            assert!(eval.grad.iter().all(|&g| g == 0.0));
        }
    }

    #[test]
    fn test_binary_cross_entropy_gradient_matches_finite_differences() {
        let pred = array![[0.8, 0.3], [0.4, 0.6]];
        let target = array![[1.0, 0.0], [0.0, 1.0]];
        let eval = Objective::BinaryCrossEntropy.evaluate(pred.view(), target.view()).unwrap();

        let h = 1e-3f32;
        let mut plus = pred.clone();
        plus[[1, 0]] += h;
        let mut minus = pred.clone();
        minus[[1, 0]] -= h;
        let cp = Objective::BinaryCrossEntropy.evaluate(plus.view(), target.view()).unwrap().cost;
        let cm = Objective::BinaryCrossEntropy.evaluate(minus.view(), target.view()).unwrap().cost;

        assert_abs_diff_eq!(eval.grad[[1, 0]], (cp - cm) / (2.0 * h), epsilon = 1e-2);
        assert_abs_diff_eq!(eval.error, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gradient_is_zero_where_probabilities_are_clamped() {
        let pred = array![[0.0, 1.0], [0.5, 0.5]];
        let target = array![[1.0, 0.0], [1.0, 0.0]];

        let eval = Objective::CrossEntropy.evaluate(pred.view(), target.view()).unwrap();
        assert_eq!(eval.grad[[0, 0]], 0.0);
        assert_abs_diff_eq!(eval.grad[[1, 0]], -1.0, epsilon = 1e-6);

        let eval = Objective::BinaryCrossEntropy.evaluate(pred.view(), target.view()).unwrap();
        assert_eq!(eval.grad[[0, 0]], 0.0);
        assert_eq!(eval.grad[[0, 1]], 0.0);
        assert!(eval.grad.row(1).iter().all(|g| g.is_finite() && *g != 0.0));
    }

    #[test]
    fn test_custom_objective_error_is_zero() {
        let objective = Objective::custom(|p, y| {
            let diff = &p - &y;
            (diff.mapv(f32::abs).sum(), diff.mapv(crate::utils::sign))
        });
        let pred = array![[1.0, -1.0]];
        let target = array![[0.0, 0.0]];

        let eval = objective.evaluate(pred.view(), target.view()).unwrap();
        assert_abs_diff_eq!(eval.cost, 2.0, epsilon = 1e-6);
        assert_eq!(eval.error, 0.0);
        assert_eq!(eval.grad, array![[1.0, -1.0]]);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let pred = array![[1.0, 2.0]];
        let target = array![[1.0, 2.0, 3.0]];
        assert!(Objective::Mse.evaluate(pred.view(), target.view()).is_err());
    }
}
