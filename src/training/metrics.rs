use chrono::Local;
use serde::{Serialize, Deserialize};

/// Wall-clock time of day appended to progress lines
pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Intra-epoch progress is reported every this many batches
pub fn progress_interval(batches: usize) -> usize {
    batches / 1000 + 1
}

pub fn batch_progress_line(epoch: usize, done: usize, total: usize, mean_error: f32) -> String {
    let percent = if total == 0 { 100.0 } else { 100.0 * done as f32 / total as f32 };
    format!("[Epoch {}] {:5.1}% mean training error: {:.5}", epoch, percent, mean_error)
}

/// What was tracked to decide when to checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tracked {
    Validation,
    Training,
}

/// Means of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_cost: f32,
    pub train_error: f32,
    /// Change from the previous epoch's mean training error
    pub train_diff: f32,
    pub valid_error: Option<f32>,
    /// Change from the best validation error seen before this epoch
    pub valid_diff: Option<f32>,
}

impl EpochMetrics {
    pub fn progress_line(&self, timestamp: &str) -> String {
        let mut line = format!(
            "[Epoch {}] 100.0% mean training error: {:.5} training diff: {:.5}",
            self.epoch, self.train_error, self.train_diff
        );
        if let (Some(error), Some(diff)) = (self.valid_error, self.valid_diff) {
            line.push_str(&format!(" validation error: {:.5} validation diff: {:.5}", error, diff));
        }
        line.push(' ');
        line.push_str(timestamp);
        line
    }
}

/// Outcome of [`Trainer::train`](super::Trainer::train)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub tracked: Tracked,
    /// Best tracked error; infinite if no epoch ever improved
    pub best_error: f32,
    /// Epoch (0-based) of the last checkpoint-worthy improvement
    pub best_epoch: Option<usize>,
    pub history: Vec<EpochMetrics>,
    pub elapsed_secs: f64,
}

impl TrainingReport {
    pub fn new(tracked: Tracked) -> Self {
        Self {
            tracked,
            best_error: f32::INFINITY,
            best_epoch: None,
            history: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    pub fn record(&mut self, metrics: EpochMetrics) {
        self.history.push(metrics);
    }

    pub fn improve(&mut self, epoch: usize, error: f32) {
        self.best_error = error;
        self.best_epoch = Some(epoch);
    }

    pub fn summary_line(&self) -> String {
        let kind = match self.tracked {
            Tracked::Validation => "validation",
            Tracked::Training => "train",
        };
        match self.best_epoch {
            Some(epoch) => format!(
                "Optimization complete. Best {} error of {:.5} obtained at epoch {}",
                kind,
                self.best_error,
                epoch + 1
            ),
            None => format!("Optimization complete. No {} error improved during training", kind),
        }
    }
}
