use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Serialize, Deserialize};
use std::path::Path;

use super::{Activation, Layer, Linear, ModelError, Parameter};
use crate::training::checkpoint::{self, CheckpointError};
use crate::utils::io::{self, IoError};

/// Intermediate values of a forward pass, kept for the backward pass.
///
/// Entry 0 is the input and the last entry is the network output; what sits
/// in between is up to the network that produced the cache.
#[derive(Debug)]
pub struct ForwardCache {
    values: Vec<Array2<f32>>,
}

impl ForwardCache {
    pub fn new(input: Array2<f32>) -> Self {
        Self { values: vec![input] }
    }

    pub fn push(&mut self, value: Array2<f32>) {
        self.values.push(value);
    }

    pub fn get(&self, index: usize) -> ArrayView2<'_, f32> {
        self.values[index].view()
    }

    pub fn output(&self) -> ArrayView2<'_, f32> {
        self.values[self.values.len() - 1].view()
    }

    pub fn into_output(mut self) -> Array2<f32> {
        self.values.pop().unwrap_or_default()
    }
}

/// What the trainer needs from a model.
///
/// Implementations must return gradients from [`Network::backward`] in the
/// same order as [`Network::params`]. A network must not be trained by two
/// trainers at once; nothing enforces this.
pub trait Network {
    fn params(&self) -> Vec<&Parameter>;

    fn params_mut(&mut self) -> Vec<&mut Parameter>;

    fn forward(&self, input: ArrayView2<f32>) -> Result<ForwardCache, ModelError>;

    /// Gradients of every parameter given the gradient of the cost w.r.t. the output
    fn backward(&self, cache: &ForwardCache, grad_output: ArrayView2<f32>) -> Vec<Array2<f32>>;

    fn apply(&self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        Ok(self.forward(input)?.into_output())
    }

    /// Writes a snapshot of every parameter to `path`
    fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        checkpoint::save_params(path, &self.params())
    }

    /// Restores a snapshot written by [`Network::save`] on an identically shaped network
    fn load(&mut self, path: &Path) -> Result<(), CheckpointError> {
        checkpoint::load_params(path, &mut self.params_mut())
    }
}

/// A feed-forward network made of an ordered, replaceable list of layers
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// `Linear -> activation` pairs through `sizes`, e.g. `[66, 256, 64]`
    /// gives two linear layers each followed by `activation`.
    pub fn dense_stack<R: Rng + ?Sized>(
        sizes: &[usize],
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        if sizes.len() < 2 {
            return Err(ModelError::ConfigError(format!(
                "need at least an input and an output size, got {:?}",
                sizes
            )));
        }

        let mut layers: Vec<Layer> = Vec::with_capacity(2 * (sizes.len() - 1));
        for pair in sizes.windows(2) {
            layers.push(Linear::new(pair[0], pair[1], rng)?.into());
            layers.push(activation.into());
        }
        Ok(Self { layers })
    }

    /// Reads a network (layers and parameters) written by [`Sequential::to_file`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IoError> {
        io::deserialize_from_file(path)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        io::serialize_to_file(path, self)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Replaces the active layer sequence
    pub fn set_layers(&mut self, layers: Vec<Layer>) {
        self.layers = layers;
    }

    /// Removes and returns the active layer sequence, leaving the network empty
    pub fn take_layers(&mut self) -> Vec<Layer> {
        std::mem::take(&mut self.layers)
    }

    /// Output of the first `depth` layers
    pub fn hidden(&self, input: ArrayView2<f32>, depth: usize) -> Result<Array2<f32>, ModelError> {
        if depth > self.layers.len() {
            return Err(ModelError::ConfigError(format!(
                "depth {} exceeds the {} available layers",
                depth,
                self.layers.len()
            )));
        }

        let mut x = input.to_owned();
        for layer in &self.layers[..depth] {
            x = layer.forward(x.view())?;
        }
        Ok(x)
    }
}

impl Network for Sequential {
    fn params(&self) -> Vec<&Parameter> {
        self.layers.iter().flat_map(|l| l.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<ForwardCache, ModelError> {
        let mut cache = ForwardCache::new(input.to_owned());
        for layer in &self.layers {
            let next = layer.forward(cache.output())?;
            cache.push(next);
        }
        Ok(cache)
    }

    fn backward(&self, cache: &ForwardCache, grad_output: ArrayView2<f32>) -> Vec<Array2<f32>> {
        let mut per_layer: Vec<Vec<Array2<f32>>> = vec![Vec::new(); self.layers.len()];
        let mut grad = grad_output.to_owned();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let (d_input, d_params) = layer.backward(cache.get(i), cache.get(i + 1), grad.view());
            per_layer[i] = d_params;
            grad = d_input;
        }

        per_layer.into_iter().flatten().collect()
    }
}
