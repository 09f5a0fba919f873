//! Utility functions shared by the model and training code
pub mod math;
pub mod io;

// Re-export commonly used utilities
pub use math::*;
pub use io::*;
