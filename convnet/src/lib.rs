//! The two experiments behind the `convnet` command line tool: a stacked 1D
//! convolutional regressor that extrapolates a timeseries, and a single dense
//! layer classifier trained with plain gradient descent.

pub mod classifier;
pub mod inputs;
pub mod regressor;

use datasets::DatasetError;
use ml::ModelError;
use ndarray_npy::{ReadNpyError, ReadNpzError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("Could not read input. Filesystem reported error\n {0}.")]
    Io(#[from] std::io::Error),
    #[error("Configuration file is not valid JSON for this experiment:\n {0}.")]
    Config(#[from] serde_json::Error),
    #[error("Timeseries not readable:\n {0}.")]
    Npy(#[from] ReadNpyError),
    #[error("Dataset archive not readable:\n {0}.")]
    Npz(#[from] ReadNpzError),
    #[error("Input had unrecognized type {0:?}. Only .npy timeseries and .npz datasets are supported.")]
    UnsupportedInput(String),
}

pub type ExperimentResult<T> = std::result::Result<T, ExperimentError>;
