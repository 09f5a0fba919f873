// error.rs
use thiserror::Error;

use crate::model::ModelError;
use crate::training::{CheckpointError, DatasetError, TrainingError};
use crate::utils::io::IoError;

#[derive(Error, Debug)]
pub enum GaitNetError {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
