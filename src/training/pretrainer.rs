use log::info;
use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};
use std::ops::Range;
use std::time::Instant;

use super::{Dataset, Trainer, TrainingConfig, TrainingError};
use crate::model::{AutoEncoder, Layer, Sequential};

/// Outcome of pretraining one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    /// Position of the block in the original layer sequence
    pub layers: Range<usize>,
    /// Best reconstruction error reached
    pub best_error: f32,
    /// Mean training cost of the last epoch
    pub final_cost: f32,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PretrainReport {
    pub blocks: Vec<BlockReport>,
    pub elapsed_secs: f64,
}

impl PretrainReport {
    pub fn iterations(&self) -> usize {
        self.blocks.len()
    }
}

/// Activation layer positions, preceded by a virtual boundary at -1
pub fn activation_boundaries(layers: &[Layer]) -> Vec<isize> {
    std::iter::once(-1)
        .chain(
            layers
                .iter()
                .enumerate()
                .filter(|(_, l)| l.is_activation())
                .map(|(i, _)| i as isize),
        )
        .collect()
}

/// Layer ranges trained one at a time, in order.
///
/// Each block runs from just after one activation boundary up to and
/// including the next. Layers after the second-to-last activation are left
/// for finetuning. A single block on its own is not worth a greedy pass, so
/// networks with fewer than three activations yield no blocks.
pub fn pretraining_blocks(layers: &[Layer]) -> Vec<Range<usize>> {
    let boundaries = activation_boundaries(layers);
    let iterations = boundaries.len() as isize - 2;
    if iterations < 2 {
        return Vec::new();
    }

    boundaries[..=iterations as usize]
        .windows(2)
        .map(|pair| (pair[0] + 1) as usize..(pair[1] + 1) as usize)
        .collect()
}

/// Greedy layer-wise pretraining of a stacked autoencoder.
///
/// Every block is trained as a tied-weight autoencoder on the hidden
/// representation produced by the blocks before it, then the network is
/// reassembled as `pretrained blocks + finetuning layers`.
pub struct PreTrainer {
    trainer: Trainer,
}

impl PreTrainer {
    pub fn new(config: TrainingConfig) -> Result<Self, TrainingError> {
        Ok(Self { trainer: Trainer::new(config)? })
    }

    /// Uses an already configured trainer, e.g. one carrying a custom objective
    pub fn from_trainer(trainer: Trainer) -> Self {
        Self { trainer }
    }

    /// Pretrains `network` in place on `input`.
    ///
    /// On error the network gets its original layers back.
    pub fn pretrain(
        &mut self,
        network: &mut Sequential,
        input: ArrayView2<f32>,
    ) -> Result<PretrainReport, TrainingError> {
        if network.is_empty() {
            return Err(TrainingError::Config("network has no layers to pretrain".into()));
        }
        if input.nrows() == 0 {
            return Err(TrainingError::Config("pretraining input is empty".into()));
        }

        let blocks = pretraining_blocks(network.layers());
        let Some(stack_end) = blocks.last().map(|b| b.end) else {
            if self.trainer.config().logging {
                info!("... no pretrainable blocks, network left unchanged");
            }
            return Ok(PretrainReport::default());
        };

        if self.trainer.config().logging {
            info!("... pretraining");
        }
        let start = Instant::now();
        let mut original = network.take_layers();

        let (pretrained, mut report) = match self.train_blocks(network, &original, &blocks, input) {
            Ok(result) => result,
            Err(e) => {
                network.set_layers(original);
                return Err(e);
            }
        };

        let finetuning = original.split_off(stack_end);
        network.set_layers(pretrained.into_iter().chain(finetuning).collect());

        report.elapsed_secs = start.elapsed().as_secs_f64();
        if self.trainer.config().logging {
            info!("Pretraining complete. Took {:.2}m", report.elapsed_secs / 60.0);
        }
        Ok(report)
    }

    fn train_blocks(
        &mut self,
        network: &mut Sequential,
        layers: &[Layer],
        blocks: &[Range<usize>],
        input: ArrayView2<f32>,
    ) -> Result<(Vec<Layer>, PretrainReport), TrainingError> {
        let logging = self.trainer.config().logging;
        let mut report = PretrainReport::default();
        let mut pretrained = Vec::with_capacity(layers.len());
        let mut current: Array2<f32> = input.to_owned();

        for (iteration, range) in blocks.iter().enumerate() {
            network.set_layers(layers[range.clone()].to_vec());
            let block_start = Instant::now();

            let data = Dataset::autoencoding(current);
            let result = self
                .trainer
                .train(&mut AutoEncoder::new(network), &data, None, None)?;
            let elapsed_secs = block_start.elapsed().as_secs_f64();

            let final_cost = result.history.last().map_or(f32::NAN, |m| m.train_cost);
            if logging {
                info!("[Layer {}] 100.0% training error: {:.5}", iteration, result.best_error);
                info!("[Layer {}] Training took: {:.4}m", iteration, elapsed_secs / 60.0);
            }

            // the block's closing activation is left out of the next input
            current = self
                .trainer
                .hidden_representation(network, data.input(), network.len() - 1)?;

            report.blocks.push(BlockReport {
                layers: range.clone(),
                best_error: result.best_error,
                final_cost,
                elapsed_secs,
            });
            pretrained.extend(network.take_layers());
        }

        Ok((pretrained, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, Linear, Network};
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn linear(rng: &mut StdRng, i: usize, o: usize) -> Layer {
        Layer::Linear(Linear::new(i, o, rng).unwrap())
    }

    fn act() -> Layer {
        Layer::Activation(Activation::Tanh)
    }

    /// Activations at positions 2, 5 and 8
    fn three_activation_net() -> Sequential {
        let mut rng = StdRng::seed_from_u64(0);
        Sequential::new(vec![
            linear(&mut rng, 4, 3),
            linear(&mut rng, 3, 3),
            act(),
            linear(&mut rng, 3, 2),
            linear(&mut rng, 2, 2),
            act(),
            linear(&mut rng, 2, 2),
            linear(&mut rng, 2, 2),
            act(),
            linear(&mut rng, 2, 1),
        ])
    }

    fn pretrainer() -> PreTrainer {
        let config = TrainingConfig::new().epochs(3).batch_size(4).alpha(0.01).logging(false);
        PreTrainer::from_trainer(Trainer::new(config).unwrap())
    }

    fn input() -> Array2<f32> {
        Array2::from_shape_fn((10, 4), |(i, j)| ((i * 3 + j) % 7) as f32 / 7.0 - 0.5)
    }

    #[test]
    fn test_boundaries_start_with_virtual_index() {
        let net = three_activation_net();
        assert_eq!(activation_boundaries(net.layers()), vec![-1, 2, 5, 8]);
        assert_eq!(activation_boundaries(&[]), vec![-1]);
    }

    #[test]
    fn test_blocks_for_three_activations() {
        let net = three_activation_net();
        assert_eq!(pretraining_blocks(net.layers()), vec![0..3, 3..6]);
    }

    #[test]
    fn test_fewer_than_three_activations_yield_no_blocks() {
        let mut rng = StdRng::seed_from_u64(1);
        let two = vec![linear(&mut rng, 2, 2), act(), linear(&mut rng, 2, 2), act()];
        let one = vec![linear(&mut rng, 2, 2), act()];
        let none = vec![linear(&mut rng, 2, 2)];

        assert!(pretraining_blocks(&two).is_empty());
        assert!(pretraining_blocks(&one).is_empty());
        assert!(pretraining_blocks(&none).is_empty());
    }

    #[test]
    fn test_two_activations_pass_through() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = Sequential::dense_stack(&[4, 3, 2], Activation::Tanh, &mut rng).unwrap();
        let before = net.clone();

        let report = pretrainer().pretrain(&mut net, input().view()).unwrap();

        assert_eq!(report.iterations(), 0);
        assert_eq!(net, before);
    }

    #[test]
    fn test_three_activations_train_two_disjoint_blocks() {
        let mut net = three_activation_net();
        let before = net.clone();

        let report = pretrainer().pretrain(&mut net, input().view()).unwrap();

        assert_eq!(report.iterations(), 2);
        assert_eq!(report.blocks[0].layers, 0..3);
        assert_eq!(report.blocks[1].layers, 3..6);
        assert!(report.blocks.iter().all(|b| b.final_cost.is_finite()));

        // same structure in the original order
        assert_eq!(net.len(), before.len());
        for (a, b) in net.layers().iter().zip(before.layers()) {
            assert_eq!(a.is_activation(), b.is_activation());
            let shapes_a: Vec<_> = a.params().iter().map(|p| p.dim()).collect();
            let shapes_b: Vec<_> = b.params().iter().map(|p| p.dim()).collect();
            assert_eq!(shapes_a, shapes_b);
        }

        // both blocks were trained, finetuning layers were not
        assert_ne!(net.layers()[0], before.layers()[0]);
        assert_ne!(net.layers()[3], before.layers()[3]);
        assert_eq!(net.layers()[6..], before.layers()[6..]);
        assert!(net.apply(input().view()).is_ok());
    }

    #[test]
    fn test_empty_input_is_config_error() {
        let mut net = three_activation_net();
        let err = pretrainer()
            .pretrain(&mut net, Array2::zeros((0, 4)).view())
            .unwrap_err();
        assert!(matches!(err, TrainingError::Config(_)));
        assert_eq!(net.len(), 10);
    }

    #[test]
    fn test_failure_restores_original_layers() {
        let mut net = three_activation_net();
        let before = net.clone();
        // wrong width: the first block cannot consume this input
        let bad = Array2::from_elem((8, 5), 0.1f32);

        assert!(pretrainer().pretrain(&mut net, bad.view()).is_err());
        assert_eq!(net, before);
    }
}
