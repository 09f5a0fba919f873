use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

use crate::utils::io::{self, IoError};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset error: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

/// Paired input/output rows.
///
/// For semi-supervised targets an all-zero output row marks an unlabeled
/// example. Autoencoding datasets use the input as the output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    input: Array2<f32>,
    output: Array2<f32>,
}

impl Dataset {
    pub fn new(input: Array2<f32>, output: Array2<f32>) -> Result<Self, DatasetError> {
        let data = Self { input, output };
        data.validate()?;
        Ok(data)
    }

    /// A dataset whose target is its own input
    pub fn autoencoding(input: Array2<f32>) -> Self {
        let output = input.clone();
        Self { input, output }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let data: Self = io::deserialize_from_file(path)?;
        data.validate()?;
        Ok(data)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        io::serialize_to_file(path, self)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), DatasetError> {
        if self.input.nrows() != self.output.nrows() {
            return Err(DatasetError::Invalid(format!(
                "{} input rows but {} output rows",
                self.input.nrows(),
                self.output.nrows()
            )));
        }
        Ok(())
    }

    pub fn input(&self) -> ArrayView2<'_, f32> {
        self.input.view()
    }

    pub fn output(&self) -> ArrayView2<'_, f32> {
        self.output.view()
    }

    pub fn len(&self) -> usize {
        self.input.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.input.nrows() == 0
    }
}
