use ndarray::{Array2, Zip};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::TrainingConfig;
use crate::model::Parameter;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Expected {expected} gradients, got {actual}")]
    GradientCount { expected: usize, actual: usize },
    #[error("Gradient for parameter {index} ({name}) has shape {actual:?}, expected {expected:?}")]
    GradientShape {
        index: usize,
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Adam hyper-parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AdamOptimizer {
    pub alpha: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamOptimizer {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl From<&TrainingConfig> for AdamOptimizer {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            alpha: config.alpha,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.eps,
        }
    }
}

/// Moment accumulators for one training run.
///
/// Created fresh at the start of every run and dropped when it ends.
#[derive(Debug, Clone)]
pub struct OptimizerState {
    /// First raw moment per parameter
    m0: Vec<Array2<f32>>,
    /// Second raw moment per parameter
    m1: Vec<Array2<f32>>,
    /// Shared step counter, starts at 1
    t: u64,
}

impl OptimizerState {
    pub fn new(params: &[&Parameter]) -> Self {
        Self {
            m0: params.iter().map(|p| Array2::zeros(p.dim())).collect(),
            m1: params.iter().map(|p| Array2::zeros(p.dim())).collect(),
            t: 1,
        }
    }

    pub fn t(&self) -> u64 {
        self.t
    }

    pub fn first_moments(&self) -> &[Array2<f32>] {
        &self.m0
    }

    pub fn second_moments(&self) -> &[Array2<f32>] {
        &self.m1
    }
}

impl AdamOptimizer {
    pub fn new(alpha: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self { alpha, beta1, beta2, eps }
    }

    /// Applies one update to every parameter and advances `t` once.
    ///
    /// `grads` must be computed before calling, in the order of `params`.
    /// Shapes are checked up front so a bad call modifies nothing.
    pub fn step(
        &self,
        state: &mut OptimizerState,
        params: &mut [&mut Parameter],
        grads: &[Array2<f32>],
    ) -> Result<(), OptimizerError> {
        if grads.len() != params.len() || state.m0.len() != params.len() {
            return Err(OptimizerError::GradientCount {
                expected: params.len(),
                actual: grads.len(),
            });
        }
        for (index, ((param, grad), m0)) in params.iter().zip(grads).zip(&state.m0).enumerate() {
            if grad.dim() != param.dim() || m0.dim() != param.dim() {
                return Err(OptimizerError::GradientShape {
                    index,
                    name: param.name.clone(),
                    expected: param.dim(),
                    actual: grad.dim(),
                });
            }
        }

        let (beta1, beta2, alpha, eps) = (self.beta1, self.beta2, self.alpha, self.eps);
        let t = state.t as f32;
        let correction1 = 1.0 - beta1.powf(t);
        let correction2 = 1.0 - beta2.powf(t);

        for (((param, grad), m0), m1) in params
            .iter_mut()
            .zip(grads)
            .zip(state.m0.iter_mut())
            .zip(state.m1.iter_mut())
        {
            Zip::from(&mut param.value)
                .and(grad)
                .and(m0)
                .and(m1)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= alpha * (*m / correction1) / ((*v / correction2).sqrt() + eps);
                });
        }

        state.t += 1;
        Ok(())
    }
}
