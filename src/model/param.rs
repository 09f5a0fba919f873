use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Serialize, Deserialize};

use super::ModelError;

/// A named, trainable array owned by a layer.
///
/// `regularisable` decides whether the L1/L2 penalties see this parameter at
/// all; biases are typically excluded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Array2<f32>,
    pub regularisable: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Array2<f32>, regularisable: bool) -> Self {
        Self {
            name: name.into(),
            value,
            regularisable,
        }
    }

    pub fn zeros(name: impl Into<String>, shape: (usize, usize), regularisable: bool) -> Self {
        Self::new(name, Array2::zeros(shape), regularisable)
    }

    /// Gaussian initialisation with the given standard deviation
    pub fn normal<R: Rng + ?Sized>(
        name: impl Into<String>,
        shape: (usize, usize),
        std: f32,
        regularisable: bool,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        if !(std.is_finite() && std > 0.0) {
            return Err(ModelError::InitializationError(format!(
                "standard deviation must be positive and finite, got {}",
                std
            )));
        }
        let normal = Normal::new(0.0, std).map_err(|e| {
            ModelError::InitializationError(e.to_string())
        })?;

        Ok(Self::new(
            name,
            Array2::from_shape_fn(shape, |_| normal.sample(rng)),
            regularisable,
        ))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.value.dim()
    }
}
