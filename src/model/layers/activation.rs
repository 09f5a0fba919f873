use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Serialize, Deserialize};

use crate::utils::softmax_2d;

/// Element-wise (or row-wise, for softmax) nonlinearity.
///
/// Activation layers are the boundaries used to split a deep stack into
/// pretraining blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Tanh,
    Relu,
    Sigmoid,
    /// Exponential linear unit with `alpha = 1`
    Elu,
    /// Row-wise softmax
    Softmax,
}

impl Activation {
    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Tanh => x.mapv(f32::tanh),
            Activation::Relu => x.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Elu => x.mapv(|v| if v > 0.0 { v } else { v.exp() - 1.0 }),
            Activation::Softmax => {
                let mut out = x.to_owned();
                softmax_2d(&mut out.view_mut());
                out
            }
        }
    }

    /// Gradient w.r.t. the input given the forward `input`, its `output` and
    /// the upstream gradient.
    pub fn backward(
        &self,
        input: ArrayView2<f32>,
        output: ArrayView2<f32>,
        grad_output: ArrayView2<f32>,
    ) -> Array2<f32> {
        match self {
            Activation::Tanh => Zip::from(&output)
                .and(&grad_output)
                .map_collect(|&y, &g| g * (1.0 - y * y)),
            Activation::Relu => Zip::from(&input)
                .and(&grad_output)
                .map_collect(|&x, &g| if x > 0.0 { g } else { 0.0 }),
            Activation::Sigmoid => Zip::from(&output)
                .and(&grad_output)
                .map_collect(|&y, &g| g * y * (1.0 - y)),
            Activation::Elu => Zip::from(&input)
                .and(&output)
                .and(&grad_output)
                .map_collect(|&x, &y, &g| if x > 0.0 { g } else { g * (y + 1.0) }),
            Activation::Softmax => {
                // dx = y * (g - sum(g * y)) per row
                let dot = (&grad_output * &output).sum_axis(Axis(1)).insert_axis(Axis(1));
                &output * &(&grad_output - &dot)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Elu => "elu",
            Activation::Softmax => "softmax",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tanh" => Some(Activation::Tanh),
            "relu" => Some(Activation::Relu),
            "sigmoid" => Some(Activation::Sigmoid),
            "elu" => Some(Activation::Elu),
            "softmax" => Some(Activation::Softmax),
            _ => None,
        }
    }
}
