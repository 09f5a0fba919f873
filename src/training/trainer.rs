use log::info;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

use super::adam::{AdamOptimizer, OptimizerError, OptimizerState};
use super::batch::{BatchResult, BatchRunner, Pass};
use super::checkpoint::CheckpointError;
use super::dataset::{Dataset, DatasetError};
use super::metrics::{timestamp, EpochMetrics, Tracked, TrainingReport};
use super::objective::Objective;
use super::regularizer::Regularizer;
use super::TrainingConfig;
use crate::model::{ModelError, Network, Sequential};
use crate::utils::argmax_rows;
use crate::utils::io::{self, IoError};

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Invalid training configuration: {0}")]
    Config(String),
    #[error("Training diverged: cost is NaN at epoch {epoch}, batch {batch}")]
    Diverged { epoch: usize, batch: usize },
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("IO error during training: {0}")]
    Io(#[from] IoError),
}

/// Mini-batch Adam training with validation-driven checkpointing.
///
/// Optimizer moments live only for the duration of one [`Trainer::train`]
/// call; the trainer itself carries configuration and the shuffling RNG.
pub struct Trainer {
    config: TrainingConfig,
    objective: Objective,
    optimizer: AdamOptimizer,
    regularizer: Regularizer,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self, TrainingError> {
        config.validate().map_err(TrainingError::Config)?;
        Ok(Self {
            objective: config.objective.into(),
            optimizer: AdamOptimizer::from(&config),
            regularizer: Regularizer::new(config.l1_weight, config.l2_weight),
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    /// Replaces the configured objective, e.g. with [`Objective::custom`]
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `network` for the configured number of epochs.
    ///
    /// With `valid` set, a checkpoint is written whenever the validation
    /// error improves; otherwise whenever the training error improves.
    /// `checkpoint` of `None` disables persistence but keeps the bookkeeping.
    pub fn train<N: Network + ?Sized>(
        &mut self,
        network: &mut N,
        train: &Dataset,
        valid: Option<&Dataset>,
        checkpoint: Option<&Path>,
    ) -> Result<TrainingReport, TrainingError> {
        let batch_size = self.config.batch_size;
        let logging = self.config.logging;

        let mut state = {
            let params = network.params();
            if params.is_empty() {
                return Err(TrainingError::Config("network has no parameters to train".into()));
            }
            OptimizerState::new(&params)
        };
        let train_runner = filled_runner(train, batch_size, "training")?.logging(logging);
        let valid_runner = valid
            .map(|data| filled_runner(data, batch_size, "validation"))
            .transpose()?;

        let mut report = TrainingReport::new(if valid_runner.is_some() {
            Tracked::Validation
        } else {
            Tracked::Training
        });

        let mut best_train_error = f32::INFINITY;
        let mut best_valid_error = f32::INFINITY;
        let mut last_train_mean = 0.0;

        if logging {
            info!("... training");
        }
        let start = Instant::now();

        for epoch in 0..self.config.epochs {
            let order = train_runner.shuffled_order(&mut self.rng);
            let stats = train_runner.run(Pass::Train { epoch }, &order, |x, y| {
                self.train_step(network, &mut state, x, y)
            })?;

            let train_error = stats.mean_error();
            let mut metrics = EpochMetrics {
                epoch,
                train_cost: stats.mean_cost(),
                train_error,
                train_diff: train_error - last_train_mean,
                valid_error: None,
                valid_diff: None,
            };
            last_train_mean = train_error;

            if let Some(runner) = &valid_runner {
                let valid_stats = runner.run(Pass::Eval, &runner.sequential_order(), |x, y| {
                    self.eval_step(&*network, x, y)
                })?;
                let valid_error = valid_stats.mean_error();
                metrics.valid_error = Some(valid_error);
                metrics.valid_diff = Some(valid_error - best_valid_error);
            }

            if logging {
                info!("{}", metrics.progress_line(&timestamp()));
            }

            // validation takes priority whenever it is configured
            let improved = match metrics.valid_error {
                Some(valid_error) if valid_error < best_valid_error => {
                    best_valid_error = valid_error;
                    Some(valid_error)
                }
                Some(_) => None,
                None if train_error < best_train_error => {
                    best_train_error = train_error;
                    Some(train_error)
                }
                None => None,
            };

            if let Some(error) = improved {
                report.improve(epoch, error);
                if let Some(path) = checkpoint {
                    network.save(path)?;
                }
            }
            report.record(metrics);
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        if logging {
            info!("{}", report.summary_line());
            info!("Training took {:.2}m", report.elapsed_secs / 60.0);
        }

        Ok(report)
    }

    /// Restores the checkpoint at `checkpoint` and returns the mean error over `data`
    pub fn evaluate<N: Network + ?Sized>(
        &self,
        network: &mut N,
        data: &Dataset,
        checkpoint: &Path,
    ) -> Result<f32, TrainingError> {
        let runner = filled_runner(data, self.config.batch_size, "test")?;
        network.load(checkpoint)?;

        if self.config.logging {
            info!("... evaluating the model");
        }

        let stats = runner.run(Pass::Eval, &runner.sequential_order(), |x, y| {
            self.eval_step(&*network, x, y)
        })?;
        let error = stats.mean_error();

        if self.config.logging {
            info!("Test set performance: {:.2} %", error * 100.0);
        }
        Ok(error)
    }

    /// Predicted 1-based class index of every row of `input`, also written to `path`
    pub fn predict<N: Network + ?Sized>(
        &self,
        network: &N,
        input: ArrayView2<f32>,
        path: &Path,
    ) -> Result<Array1<usize>, TrainingError> {
        if self.config.logging {
            info!("... predicting for new input");
        }

        let mut labels = Vec::with_capacity(input.nrows());
        for chunk in input.axis_chunks_iter(Axis(0), self.config.batch_size) {
            let output = network.apply(chunk)?;
            labels.extend(argmax_rows(output.view()).iter().map(|&class| class + 1));
        }

        let labels = Array1::from(labels);
        io::serialize_to_file(path, &labels)?;
        Ok(labels)
    }

    /// Output of the first `depth` layers for every row of `input`, computed batch by batch
    pub fn hidden_representation(
        &self,
        network: &Sequential,
        input: ArrayView2<f32>,
        depth: usize,
    ) -> Result<Array2<f32>, TrainingError> {
        let parts = input
            .axis_chunks_iter(Axis(0), self.config.batch_size)
            .map(|chunk| network.hidden(chunk, depth))
            .collect::<Result<Vec<_>, _>>()?;

        if parts.is_empty() {
            return Ok(network.hidden(input, depth)?);
        }

        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        concatenate(Axis(0), &views)
            .map_err(|e| TrainingError::Model(ModelError::DimensionMismatch(e.to_string())))
    }

    fn train_step<N: Network + ?Sized>(
        &self,
        network: &mut N,
        state: &mut OptimizerState,
        input: ArrayView2<f32>,
        target: ArrayView2<f32>,
    ) -> Result<BatchResult, TrainingError> {
        let cache = network.forward(input)?;
        let eval = self.objective.evaluate(cache.output(), target)?;
        let mut grads = network.backward(&cache, eval.grad.view());

        let cost = {
            let params = network.params();
            self.regularizer.accumulate_grads(&params, &mut grads);
            eval.cost + self.regularizer.penalty(&params)
        };

        self.optimizer.step(state, &mut network.params_mut(), &grads)?;
        Ok(BatchResult { cost, error: eval.error })
    }

    fn eval_step<N: Network + ?Sized>(
        &self,
        network: &N,
        input: ArrayView2<f32>,
        target: ArrayView2<f32>,
    ) -> Result<BatchResult, TrainingError> {
        let output = network.apply(input)?;
        let eval = self.objective.evaluate(output.view(), target)?;
        let cost = eval.cost + self.regularizer.penalty(&network.params());
        Ok(BatchResult { cost, error: eval.error })
    }
}

/// A runner over `data` that yields at least one full batch
fn filled_runner<'d>(
    data: &'d Dataset,
    batch_size: usize,
    role: &str,
) -> Result<BatchRunner<'d>, TrainingError> {
    let runner = BatchRunner::new(data, batch_size)?;
    if runner.num_batches() == 0 {
        return Err(TrainingError::Config(format!(
            "{} {} rows do not fill a single batch of {}",
            data.len(),
            role,
            batch_size
        )));
    }
    Ok(runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, Layer, Linear};
    use crate::training::ObjectiveKind;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::Rng;
    use tempfile::tempdir;

    fn quiet_config() -> TrainingConfig {
        TrainingConfig::new().logging(false).l2_weight(0.0)
    }

    fn regression_data(rows: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let input = Array2::from_shape_fn((rows, 2), |_| rng.gen_range(-1.0f32..1.0));
        let output = input.map_axis(Axis(1), |r| 2.0 * r[0] - r[1]).insert_axis(Axis(1));
        Dataset::new(input, output).unwrap()
    }

    fn linear_net(seed: u64) -> Sequential {
        let mut rng = StdRng::seed_from_u64(seed);
        Sequential::new(vec![Layer::Linear(Linear::new(2, 1, &mut rng).unwrap())])
    }

    fn classifier(seed: u64) -> Sequential {
        let mut rng = StdRng::seed_from_u64(seed);
        Sequential::new(vec![
            Layer::Linear(Linear::new(2, 2, &mut rng).unwrap()),
            Layer::Activation(Activation::Softmax),
        ])
    }

    #[test]
    fn test_training_reduces_error() {
        let data = regression_data(64, 1);
        let mut net = linear_net(2);
        let mut trainer = Trainer::new(quiet_config().epochs(60).batch_size(8).alpha(0.05)).unwrap();

        let report = trainer.train(&mut net, &data, None, None).unwrap();

        assert_eq!(report.history.len(), 60);
        assert_eq!(report.tracked, Tracked::Training);
        let first = report.history[0].train_error;
        let last = report.history[59].train_error;
        assert!(last < first * 0.1, "error went from {} to {}", first, last);
        assert_abs_diff_eq!(
            report.best_error,
            report.history.iter().map(|m| m.train_error).fold(f32::INFINITY, f32::min),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_checkpoint_tracks_best_validation_epoch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("best.bin");
        let train = regression_data(40, 3);
        let valid = regression_data(16, 4);
        let mut net = linear_net(5);
        let mut trainer = Trainer::new(quiet_config().epochs(20).batch_size(8).alpha(0.05)).unwrap();

        let report = trainer.train(&mut net, &train, Some(&valid), Some(path.as_path())).unwrap();

        assert_eq!(report.tracked, Tracked::Validation);
        let best_epoch = report.best_epoch.unwrap();
        assert_eq!(report.history[best_epoch].valid_error, Some(report.best_error));
        assert!(report
            .history
            .iter()
            .all(|m| m.valid_error.unwrap() >= report.best_error));

        // the file holds the parameters that produced the best validation error
        let mut restored = net.clone();
        let error = trainer.evaluate(&mut restored, &valid, &path).unwrap();
        assert_abs_diff_eq!(error, report.best_error, epsilon = 1e-6);
    }

    #[test]
    fn test_evaluate_restores_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.bin");
        let data = regression_data(32, 6);

        let saved = linear_net(7);
        saved.save(&path).unwrap();

        let mut other = linear_net(8);
        let trainer = Trainer::new(quiet_config().batch_size(8)).unwrap();
        let error = trainer.evaluate(&mut other, &data, &path).unwrap();

        assert_eq!(other, saved);
        assert!(error.is_finite());
    }

    #[test]
    fn test_unlabeled_batches_do_not_break_cross_entropy_training() {
        // rows 4..8 form an unlabeled batch
        let input = Array2::from_shape_fn((12, 2), |(i, j)| ((i + j) % 3) as f32 - 1.0);
        let mut output = Array2::zeros((12, 2));
        for i in (0..4).chain(8..12) {
            output[[i, i % 2]] = 1.0;
        }
        let data = Dataset::new(input, output).unwrap();

        let mut net = classifier(9);
        let config = quiet_config().epochs(3).batch_size(4).objective(ObjectiveKind::CrossEntropy);
        let report = Trainer::new(config).unwrap().train(&mut net, &data, None, None).unwrap();

        for metrics in &report.history {
            assert!(metrics.train_error.is_finite());
            assert!(metrics.train_cost.is_finite());
        }
    }

    #[test]
    fn test_nan_cost_is_fatal() {
        let data = regression_data(16, 10);
        let mut net = linear_net(11);
        let mut trainer = Trainer::new(quiet_config().epochs(5).batch_size(4))
            .unwrap()
            .with_objective(Objective::custom(|p, _| (f32::NAN, Array2::zeros(p.dim()))));

        let err = trainer.train(&mut net, &data, None, None).unwrap_err();
        assert!(matches!(err, TrainingError::Diverged { epoch: 0, .. }));
    }

    #[test]
    fn test_dataset_smaller_than_batch_is_config_error() {
        let data = regression_data(3, 12);
        let mut net = linear_net(13);
        let mut trainer = Trainer::new(quiet_config().batch_size(4)).unwrap();

        let err = trainer.train(&mut net, &data, None, None).unwrap_err();
        assert!(matches!(err, TrainingError::Config(_)));
    }

    #[test]
    fn test_empty_network_is_config_error() {
        let data = Dataset::autoencoding(Array2::zeros((8, 2)));
        let mut net = Sequential::new(Vec::new());
        let mut trainer = Trainer::new(quiet_config().epochs(2).batch_size(4)).unwrap();

        let err = trainer.train(&mut net, &data, None, None).unwrap_err();
        assert!(matches!(err, TrainingError::Config(_)));
    }

    #[test]
    fn test_evaluate_rejects_test_set_smaller_than_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.bin");
        let saved = linear_net(14);
        saved.save(&path).unwrap();

        let mut net = linear_net(15);
        let trainer = Trainer::new(quiet_config().batch_size(4)).unwrap();
        let err = trainer.evaluate(&mut net, &regression_data(3, 16), &path).unwrap_err();

        assert!(matches!(err, TrainingError::Config(_)));
        assert_eq!(net, linear_net(15));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Trainer::new(TrainingConfig::new().batch_size(0)),
            Err(TrainingError::Config(_))
        ));
    }

    #[test]
    fn test_predict_is_one_based_and_covers_every_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.bin");
        let net = Sequential::new(vec![Layer::Linear(Linear::from_weights(
            array![[1.0, -1.0], [-1.0, 1.0]],
            array![[0.0, 0.0]],
        )
        .unwrap())]);
        let input = array![[2.0, 0.0], [0.0, 2.0], [1.0, 0.5], [0.0, 3.0], [5.0, 1.0]];

        let trainer = Trainer::new(quiet_config().batch_size(2)).unwrap();
        let labels = trainer.predict(&net, input.view(), &path).unwrap();

        assert_eq!(labels.to_vec(), vec![1, 2, 1, 2, 1]);
        let stored: Array1<usize> = io::deserialize_from_file(&path).unwrap();
        assert_eq!(stored, labels);
    }

    #[test]
    fn test_hidden_representation_includes_trailing_rows() {
        let mut rng = StdRng::seed_from_u64(14);
        let net = Sequential::dense_stack(&[3, 4, 2], Activation::Tanh, &mut rng).unwrap();
        let input = Array2::from_shape_fn((7, 3), |(i, j)| (i as f32 - j as f32) * 0.1);

        let trainer = Trainer::new(quiet_config().batch_size(3)).unwrap();
        let hidden = trainer.hidden_representation(&net, input.view(), 2).unwrap();

        assert_eq!(hidden.dim(), (7, 4));
        let direct = net.hidden(input.view(), 2).unwrap();
        for (a, b) in hidden.iter().zip(direct.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }
}
