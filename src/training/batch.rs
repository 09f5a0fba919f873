use log::debug;
use ndarray::{s, ArrayView2};
use rand::Rng;
use rand::seq::SliceRandom;

use super::metrics::{batch_progress_line, progress_interval};
use super::{Dataset, TrainingError};

/// Cost and error of one batch step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchResult {
    pub cost: f32,
    /// NaN when the metric is undefined for the batch
    pub error: f32,
}

/// Kind of pass over a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Parameters are updated; a NaN cost aborts the run
    Train { epoch: usize },
    /// Read-only evaluation
    Eval,
}

/// Per-batch values collected over one pass
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    costs: Vec<f32>,
    errors: Vec<f32>,
}

impl EpochStats {
    /// Undefined (NaN) errors are left out of the error mean
    pub fn record(&mut self, result: BatchResult) {
        self.costs.push(result.cost);
        if !result.error.is_nan() {
            self.errors.push(result.error);
        }
    }

    pub fn batches(&self) -> usize {
        self.costs.len()
    }

    pub fn mean_cost(&self) -> f32 {
        mean(&self.costs)
    }

    /// NaN if no batch had a defined error
    pub fn mean_error(&self) -> f32 {
        mean(&self.errors)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        f32::NAN
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Slices a dataset into fixed-size batches and drives a step function over them.
///
/// Only `floor(rows / batch_size)` full batches exist; trailing rows are
/// never visited.
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner<'a> {
    input: ArrayView2<'a, f32>,
    output: ArrayView2<'a, f32>,
    batch_size: usize,
    logging: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(data: &'a Dataset, batch_size: usize) -> Result<Self, TrainingError> {
        if batch_size == 0 {
            return Err(TrainingError::Config("batch size must be positive".into()));
        }
        Ok(Self {
            input: data.input(),
            output: data.output(),
            batch_size,
            logging: false,
        })
    }

    /// Emit intra-epoch progress for training passes
    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn num_batches(&self) -> usize {
        self.input.nrows() / self.batch_size
    }

    /// Input and output rows of batch `index`
    pub fn batch(&self, index: usize) -> (ArrayView2<'a, f32>, ArrayView2<'a, f32>) {
        let start = index * self.batch_size;
        let end = start + self.batch_size;
        (
            self.input.slice_move(s![start..end, ..]),
            self.output.slice_move(s![start..end, ..]),
        )
    }

    /// Batch indices for an evaluation pass
    pub fn sequential_order(&self) -> Vec<usize> {
        (0..self.num_batches()).collect()
    }

    /// A fresh permutation of all batch indices for a training epoch
    pub fn shuffled_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut order = self.sequential_order();
        order.shuffle(rng);
        order
    }

    /// Runs `step` once per batch in `order`
    pub fn run<F>(&self, pass: Pass, order: &[usize], mut step: F) -> Result<EpochStats, TrainingError>
    where
        F: FnMut(ArrayView2<f32>, ArrayView2<f32>) -> Result<BatchResult, TrainingError>,
    {
        let batches = self.num_batches();
        if let Some(&bad) = order.iter().find(|&&i| i >= batches) {
            return Err(TrainingError::Config(format!(
                "batch index {} out of range for {} batches",
                bad, batches
            )));
        }

        let interval = progress_interval(order.len());
        let mut stats = EpochStats::default();

        for (position, &index) in order.iter().enumerate() {
            let (input, output) = self.batch(index);
            let result = step(input, output)?;
            stats.record(result);

            if let Pass::Train { epoch } = pass {
                if result.cost.is_nan() {
                    return Err(TrainingError::Diverged { epoch, batch: index });
                }
                if self.logging && position % interval == 0 {
                    debug!("{}", batch_progress_line(epoch, position, order.len(), stats.mean_error()));
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn dataset(rows: usize) -> Dataset {
        let input = Array2::from_shape_fn((rows, 2), |(i, j)| (i * 2 + j) as f32);
        Dataset::autoencoding(input)
    }

    #[test]
    fn test_trailing_rows_are_dropped() {
        let data = dataset(23);
        let runner = BatchRunner::new(&data, 5).unwrap();
        assert_eq!(runner.num_batches(), 4);

        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = Vec::new();
        let stats = runner
            .run(Pass::Train { epoch: 0 }, &runner.shuffled_order(&mut rng), |x, _| {
                seen.push(x[[0, 0]] as usize / 2);
                Ok(BatchResult { cost: 1.0, error: 0.0 })
            })
            .unwrap();

        assert_eq!(stats.batches(), 4);
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 5, 10, 15]);
    }

    #[test]
    fn test_shuffled_order_is_permutation() {
        let data = dataset(100);
        let runner = BatchRunner::new(&data, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let mut order = runner.shuffled_order(&mut rng);
        order.sort_unstable();
        assert_eq!(order, runner.sequential_order());
    }

    #[test]
    fn test_eval_pass_is_sequential() {
        let data = dataset(12);
        let runner = BatchRunner::new(&data, 4).unwrap();

        let mut firsts = Vec::new();
        runner
            .run(Pass::Eval, &runner.sequential_order(), |x, _| {
                firsts.push(x[[0, 0]]);
                Ok(BatchResult { cost: 0.0, error: 0.0 })
            })
            .unwrap();
        assert_eq!(firsts, vec![0.0, 8.0, 16.0]);
    }

    #[test]
    fn test_nan_error_excluded_but_cost_counted() {
        let data = dataset(9);
        let runner = BatchRunner::new(&data, 3).unwrap();
        let results = [
            BatchResult { cost: 1.0, error: 0.5 },
            BatchResult { cost: 2.0, error: f32::NAN },
            BatchResult { cost: 3.0, error: 0.25 },
        ];

        let mut next = results.iter();
        let stats = runner
            .run(Pass::Train { epoch: 0 }, &runner.sequential_order(), |_, _| {
                Ok(*next.next().unwrap())
            })
            .unwrap();

        assert_eq!(stats.batches(), 3);
        assert_abs_diff_eq!(stats.mean_cost(), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.mean_error(), 0.375, epsilon = 1e-6);
    }

    #[test]
    fn test_nan_cost_aborts_training_pass() {
        let data = dataset(10);
        let runner = BatchRunner::new(&data, 2).unwrap();

        let mut calls = 0;
        let err = runner
            .run(Pass::Train { epoch: 4 }, &runner.sequential_order(), |_, _| {
                calls += 1;
                let cost = if calls == 2 { f32::NAN } else { 1.0 };
                Ok(BatchResult { cost, error: 0.0 })
            })
            .unwrap_err();

        assert!(matches!(err, TrainingError::Diverged { epoch: 4, batch: 1 }));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let data = dataset(4);
        assert!(matches!(BatchRunner::new(&data, 0), Err(TrainingError::Config(_))));
    }
}
