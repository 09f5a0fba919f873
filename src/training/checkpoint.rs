use ndarray::Array2;
use serde::{Serialize, Deserialize};
use std::path::Path;

use crate::model::Parameter;
use crate::utils::io::{self, IoError};

/// Error type for checkpoint operations
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] IoError),
    #[error("Checkpoint does not match the network: {0}")]
    Mismatch(String),
}

/// Parameter arrays in network order, as read back from disk
#[derive(Deserialize)]
pub struct Checkpoint {
    pub params: Vec<(String, Array2<f32>)>,
}

/// Borrowing twin of [`Checkpoint`] so saving does not copy every array
#[derive(Serialize)]
struct CheckpointData<'a> {
    params: Vec<(&'a str, &'a Array2<f32>)>,
}

/// Saves a snapshot of `params`.
///
/// The file is published atomically; a crash mid-write leaves any previous
/// checkpoint at `path` intact.
pub fn save_params(path: impl AsRef<Path>, params: &[&Parameter]) -> Result<(), CheckpointError> {
    let data = CheckpointData {
        params: params.iter().map(|p| (p.name.as_str(), &p.value)).collect(),
    };
    io::serialize_to_file(path, &data)?;
    Ok(())
}

/// Loads a checkpoint file without applying it
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint, CheckpointError> {
    Ok(io::deserialize_from_file(path)?)
}

/// Restores `params` from a snapshot written by [`save_params`].
///
/// Parameters are matched by position; count, names and shapes must all
/// agree or nothing is modified.
pub fn load_params(path: impl AsRef<Path>, params: &mut [&mut Parameter]) -> Result<(), CheckpointError> {
    let checkpoint = load_checkpoint(path)?;

    if checkpoint.params.len() != params.len() {
        return Err(CheckpointError::Mismatch(format!(
            "checkpoint holds {} parameters, network has {}",
            checkpoint.params.len(),
            params.len()
        )));
    }

    for (i, ((name, value), param)) in checkpoint.params.iter().zip(params.iter()).enumerate() {
        if name != &param.name || value.dim() != param.value.dim() {
            return Err(CheckpointError::Mismatch(format!(
                "parameter {}: checkpoint has {} {:?}, network has {} {:?}",
                i,
                name,
                value.dim(),
                param.name,
                param.value.dim()
            )));
        }
    }

    for ((_, value), param) in checkpoint.params.into_iter().zip(params.iter_mut()) {
        param.value = value;
    }
    Ok(())
}
