use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::model::{ModelError, Parameter};

/// A linear (fully-connected) layer: `y = x · W + b`
///
/// `W` has shape `[input_dim, output_dim]` and is regularisable, `b` has
/// shape `[1, output_dim]` and is not.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Linear {
    pub weight: Parameter,
    pub bias: Parameter,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        output_dim: usize,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        if input_dim == 0 || output_dim == 0 {
            return Err(ModelError::ConfigError(format!(
                "linear layer needs non-zero dimensions, got {}x{}",
                input_dim, output_dim
            )));
        }
        let std = (2.0 / (input_dim + output_dim) as f32).sqrt();

        Ok(Self {
            weight: Parameter::normal("W", (input_dim, output_dim), std, true, rng)?,
            bias: Parameter::zeros("b", (1, output_dim), false),
        })
    }

    /// Builds a layer from explicit weights, mainly for tests and imports
    pub fn from_weights(weight: Array2<f32>, bias: Array2<f32>) -> Result<Self, ModelError> {
        if bias.dim() != (1, weight.ncols()) {
            return Err(ModelError::DimensionMismatch(format!(
                "bias shape {:?} does not fit weight shape {:?}",
                bias.dim(),
                weight.dim()
            )));
        }
        Ok(Self {
            weight: Parameter::new("W", weight, true),
            bias: Parameter::new("b", bias, false),
        })
    }

    pub fn input_dim(&self) -> usize {
        self.weight.value.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.value.ncols()
    }

    fn check_cols(&self, x: &ArrayView2<f32>, expected: usize) -> Result<(), ModelError> {
        if x.ncols() != expected {
            return Err(ModelError::DimensionMismatch(format!(
                "linear layer expected {} columns, got {}",
                expected,
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Forward pass for a batch `[rows, input_dim]`
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_cols(&x, self.input_dim())?;
        Ok(x.dot(&self.weight.value) + &self.bias.value)
    }

    /// Gradients of a forward pass.
    ///
    /// Returns `(d_input, [d_weight, d_bias])`.
    pub fn backward(
        &self,
        x: ArrayView2<f32>,
        grad_output: ArrayView2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        let d_weight = x.t().dot(&grad_output);
        let d_bias = grad_output.sum_axis(Axis(0)).insert_axis(Axis(0));
        let d_input = grad_output.dot(&self.weight.value.t());
        (d_input, vec![d_weight, d_bias])
    }

    /// Tied-weight inverse: `x = (h - b) · Wᵀ`
    pub fn inverse(&self, h: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.check_cols(&h, self.output_dim())?;
        Ok((&h - &self.bias.value).dot(&self.weight.value.t()))
    }

    /// Gradients of [`Linear::inverse`], same layout as [`Linear::backward`]
    pub fn inverse_backward(
        &self,
        h: ArrayView2<f32>,
        grad_output: ArrayView2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        let centered = &h - &self.bias.value;
        let d_weight = grad_output.t().dot(&centered);
        let d_input = grad_output.dot(&self.weight.value);
        let d_bias = -d_input.sum_axis(Axis(0)).insert_axis(Axis(0));
        (d_input, vec![d_weight, d_bias])
    }
}
