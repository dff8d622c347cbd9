//! Small numeric library for one-dimensional convolutional networks.
//!
//! Tensors are plain `ndarray` arrays in channels-last layout, so a batch of
//! sequences has shape (batch, steps, channels) and a batch of flat feature
//! vectors has shape (batch, features). Every layer implements its own
//! backward pass; there is no autodiff graph.
pub mod activation_functions;
pub mod convolutions;
pub mod fully_connected;
#[cfg(test)]
mod gradient_check;
pub mod initializers;
pub mod losses;
mod model_errors;
pub mod models;
pub mod optimizers;
pub mod pooling;
pub mod training;
pub mod weight_loader;

pub use model_errors::ModelError;

pub type WeightPrecision = f32;
pub type DataPrecision = f32;

/// Returned from everything that checks shapes or touches parameters.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
