use ndarray::ShapeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Window size must satisfy 0 < window size < series length, got {window_size} for a series of length {length}.")]
    InvalidWindowSize { window_size: usize, length: usize },
    #[error("Timeseries must be a vector or a (samples, series) matrix, got an array of rank {0}.")]
    UnsupportedRank(usize),
    #[error("Cannot hold out {test_size} of {available} instances, need 0 < test size < instances.")]
    InvalidSplit { test_size: usize, available: usize },
    #[error("Got {rows} samples but {labels} labels.")]
    LabelCount { rows: usize, labels: usize },
    #[error("Array could not be reshaped:\n {0}.")]
    Shape(#[from] ShapeError),
    #[error("Arrays differ in shape: {0:?} vs {1:?}.")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
    #[error("Cannot compute statistics of empty arrays.")]
    Empty,
}
