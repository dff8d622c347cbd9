use crate::weight_loader::WeightError;
use ndarray::ShapeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Shape mismatch in {context}: expected {expected:?}, got {found:?}.")]
    Shape {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),
    #[error("Backward pass through layer {0} requested before a forward pass.")]
    NoForwardPass(String),
    #[error("Cannot train or evaluate on an empty dataset.")]
    EmptyDataset,
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),
    #[error("Array could not be reshaped:\n {0}.")]
    ArrayShapeError(#[from] ShapeError),
    #[error(transparent)]
    WeightError(#[from] WeightError),
}

impl ModelError {
    pub(crate) fn shape(context: &str, expected: &[usize], found: &[usize]) -> Self {
        ModelError::Shape {
            context: context.to_string(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
