//! Training infrastructure for gaitnet
//!
//! [`Trainer`] runs mini-batch Adam over any [`Network`](crate::model::Network)
//! with validation-driven checkpointing; [`PreTrainer`] uses it to pretrain
//! deep stacks one autoencoder block at a time.

pub mod adam;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod metrics;
pub mod objective;
pub mod pretrainer;
pub mod regularizer;
pub mod trainer;

// Re-export main components
pub use adam::{AdamOptimizer, OptimizerError, OptimizerState};
pub use batch::{BatchResult, BatchRunner, EpochStats, Pass};
pub use checkpoint::{load_checkpoint, load_params, save_params, Checkpoint, CheckpointError};
pub use config::{ObjectiveKind, TrainingConfig};
pub use dataset::{Dataset, DatasetError};
pub use metrics::{EpochMetrics, Tracked, TrainingReport};
pub use objective::{Evaluation, Objective};
pub use pretrainer::{activation_boundaries, pretraining_blocks, BlockReport, PreTrainer, PretrainReport};
pub use regularizer::Regularizer;
pub use trainer::{Trainer, TrainingError};
