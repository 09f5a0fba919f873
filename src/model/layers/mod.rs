//! Neural network layers

mod linear;
mod activation;

pub use linear::Linear;
pub use activation::Activation;

use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

use super::{ModelError, Parameter};

/// One entry of a network's ordered layer sequence
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Layer {
    Linear(Linear),
    Activation(Activation),
}

impl Layer {
    /// Whether this layer marks a pretraining block boundary
    pub fn is_activation(&self) -> bool {
        matches!(self, Layer::Activation(_))
    }

    pub fn params(&self) -> Vec<&Parameter> {
        match self {
            Layer::Linear(l) => vec![&l.weight, &l.bias],
            Layer::Activation(_) => Vec::new(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut Parameter> {
        match self {
            Layer::Linear(l) => vec![&mut l.weight, &mut l.bias],
            Layer::Activation(_) => Vec::new(),
        }
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        match self {
            Layer::Linear(l) => l.forward(x),
            Layer::Activation(a) => Ok(a.forward(x)),
        }
    }

    /// Returns the input gradient and one gradient per entry of [`Layer::params`]
    pub fn backward(
        &self,
        input: ArrayView2<f32>,
        output: ArrayView2<f32>,
        grad_output: ArrayView2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        match self {
            Layer::Linear(l) => l.backward(input, grad_output),
            Layer::Activation(a) => (a.backward(input, output, grad_output), Vec::new()),
        }
    }

    /// Decoder direction used by tied-weight autoencoders.
    ///
    /// Activations pass through unchanged on the way back.
    pub fn inverse(&self, x: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        match self {
            Layer::Linear(l) => l.inverse(x),
            Layer::Activation(_) => Ok(x.to_owned()),
        }
    }

    pub fn inverse_backward(
        &self,
        input: ArrayView2<f32>,
        grad_output: ArrayView2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        match self {
            Layer::Linear(l) => l.inverse_backward(input, grad_output),
            Layer::Activation(_) => (grad_output.to_owned(), Vec::new()),
        }
    }
}

impl From<Linear> for Layer {
    fn from(layer: Linear) -> Self {
        Layer::Linear(layer)
    }
}

impl From<Activation> for Layer {
    fn from(activation: Activation) -> Self {
        Layer::Activation(activation)
    }
}
