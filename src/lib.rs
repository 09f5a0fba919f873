pub mod model;
pub use model::{AutoEncoder, Network, Sequential};

pub mod training;
pub use training::{Dataset, Objective, PreTrainer, Trainer, TrainingConfig};

pub mod utils;

pub mod error;
pub use error::GaitNetError;
