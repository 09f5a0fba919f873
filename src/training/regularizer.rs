//! L1/L2 penalties over regularisable parameters
//!
//! Parameters whose `regularisable` flag is unset are skipped entirely: they
//! contribute neither to the penalty nor to its gradient.

use ndarray::Array2;

use crate::model::Parameter;
use crate::utils::sign;

/// Sum over regularisable parameters of `mean(|p - target|)`
pub fn l1(params: &[&Parameter], target: f32) -> f32 {
    params
        .iter()
        .filter(|p| p.regularisable)
        .map(|p| mean(p.value.iter().map(|v| (v - target).abs()), p.value.len()))
        .sum()
}

/// Sum over regularisable parameters of `mean((p - target)^2)`
pub fn l2(params: &[&Parameter], target: f32) -> f32 {
    params
        .iter()
        .filter(|p| p.regularisable)
        .map(|p| mean(p.value.iter().map(|v| (v - target).powi(2)), p.value.len()))
        .sum()
}

fn mean(values: impl Iterator<Item = f32>, n: usize) -> f32 {
    if n == 0 {
        0.0
    } else {
        values.sum::<f32>() / n as f32
    }
}

/// Weighted penalty added to the base cost of every batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularizer {
    pub l1_weight: f32,
    pub l2_weight: f32,
    /// Value parameters are pulled towards
    pub target: f32,
}

impl Regularizer {
    pub fn new(l1_weight: f32, l2_weight: f32) -> Self {
        Self { l1_weight, l2_weight, target: 0.0 }
    }

    pub fn is_active(&self) -> bool {
        self.l1_weight != 0.0 || self.l2_weight != 0.0
    }

    /// `l1_weight * L1 + l2_weight * L2`
    pub fn penalty(&self, params: &[&Parameter]) -> f32 {
        let mut total = 0.0;
        if self.l1_weight != 0.0 {
            total += self.l1_weight * l1(params, self.target);
        }
        if self.l2_weight != 0.0 {
            total += self.l2_weight * l2(params, self.target);
        }
        total
    }

    /// Adds the penalty gradient to `grads`, which follow the order of `params`
    pub fn accumulate_grads(&self, params: &[&Parameter], grads: &mut [Array2<f32>]) {
        if !self.is_active() {
            return;
        }

        for (param, grad) in params.iter().zip(grads.iter_mut()) {
            if !param.regularisable || param.value.is_empty() {
                continue;
            }
            let n = param.value.len() as f32;
            let (l1_weight, l2_weight, target) = (self.l1_weight, self.l2_weight, self.target);
            grad.zip_mut_with(&param.value, |g, &v| {
                let d = v - target;
                *g += l1_weight * sign(d) / n + l2_weight * 2.0 * d / n;
            });
        }
    }
}
