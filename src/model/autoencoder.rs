use ndarray::{Array2, ArrayView2};

use super::{ForwardCache, ModelError, Network, Parameter, Sequential};

/// Trains a layer stack to reconstruct its own input.
///
/// Encoding runs the wrapped layers in order; decoding runs their
/// [`Layer::inverse`](super::Layer::inverse) in reverse order, sharing the
/// encoder's weights. The wrapper owns no parameters of its own.
pub struct AutoEncoder<'a> {
    inner: &'a mut Sequential,
}

impl<'a> AutoEncoder<'a> {
    pub fn new(inner: &'a mut Sequential) -> Self {
        Self { inner }
    }

    /// Encoded representation (output of every wrapped layer)
    pub fn encode(&self, input: ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        self.inner.apply(input)
    }
}

impl Network for AutoEncoder<'_> {
    fn params(&self) -> Vec<&Parameter> {
        self.inner.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        self.inner.params_mut()
    }

    fn forward(&self, input: ArrayView2<f32>) -> Result<ForwardCache, ModelError> {
        let layers = self.inner.layers();
        let mut cache = ForwardCache::new(input.to_owned());

        for layer in layers {
            let next = layer.forward(cache.output())?;
            cache.push(next);
        }
        for layer in layers.iter().rev() {
            let next = layer.inverse(cache.output())?;
            cache.push(next);
        }

        Ok(cache)
    }

    fn backward(&self, cache: &ForwardCache, grad_output: ArrayView2<f32>) -> Vec<Array2<f32>> {
        let layers = self.inner.layers();
        let n = layers.len();

        let mut per_layer: Vec<Vec<Array2<f32>>> = layers
            .iter()
            .map(|l| l.params().iter().map(|p| Array2::zeros(p.dim())).collect())
            .collect();
        let mut grad = grad_output.to_owned();

        // decoder: cache entry n + k feeds the inverse of layer n - 1 - k
        for k in (0..n).rev() {
            let li = n - 1 - k;
            let (d_input, d_params) = layers[li].inverse_backward(cache.get(n + k), grad.view());
            for (acc, d) in per_layer[li].iter_mut().zip(d_params) {
                *acc += &d;
            }
            grad = d_input;
        }

        for i in (0..n).rev() {
            let (d_input, d_params) = layers[i].backward(cache.get(i), cache.get(i + 1), grad.view());
            for (acc, d) in per_layer[i].iter_mut().zip(d_params) {
                *acc += &d;
            }
            grad = d_input;
        }

        per_layer.into_iter().flatten().collect()
    }
}
