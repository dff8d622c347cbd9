//! This crate turns raw numeric data into training examples for the networks in `ml`.
//!
//! Timeseries are windowed into (features, next value) instances, class labels are
//! one-hot encoded, flat samples are reshaped and shuffled, and the `statistics`
//! module scores predictions against the held-out data.

mod dataset_errors;
pub mod encoding;
pub mod reformat;
pub mod statistics;
pub mod synthetic;
pub mod windowing;

pub use dataset_errors::DatasetError;
pub use windowing::{Instances, TrainTestSplit};

pub type SamplePrecision = f32;

/// Returned from every operation that validates its input.
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;
