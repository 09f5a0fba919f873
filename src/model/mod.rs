//! Layered networks consumed by the trainer
//!
//! The trainer only sees the [`Network`] trait: a flat parameter list, a
//! forward pass that keeps what the backward pass needs, and snapshot I/O.
//! [`Sequential`] is the concrete layer stack used for motion autoencoders,
//! and [`AutoEncoder`] turns any stack into a self-reconstructing network
//! for pretraining.

mod autoencoder;
mod error;
mod layers;
mod network;
mod param;

pub use autoencoder::AutoEncoder;
pub use error::ModelError;
pub use layers::{Activation, Layer, Linear};
pub use network::{ForwardCache, Network, Sequential};
pub use param::Parameter;
