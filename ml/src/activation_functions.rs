//! This module provides the activation functions for our networks,
//! namely Relu, Leaky Relu and Softmax.
//!
//! Relu-style activations are exposed as a free function, as an `Activation` that
//! convolutional and dense layers fuse into their forward pass, and as a
//! standalone layer.
use ndarray::*;
use serde_derive::{Deserialize, Serialize};

use crate::{
    models::{InternalDataRepresentation, Layer, Parameter},
    DataPrecision, ModelError, ModelResult,
};

const LEAKY_RELU_SLOPE: DataPrecision = 0.01;

/// Leaky relu implementation
pub fn leaky_relu<D: Dimension>(data: &Array<DataPrecision, D>) -> Array<DataPrecision, D> {
    data.mapv(|x| if x > 0. { x } else { LEAKY_RELU_SLOPE * x })
}

/// Relu implementation
pub fn relu<D: Dimension>(data: &Array<DataPrecision, D>) -> Array<DataPrecision, D> {
    data.mapv(|x| if x > 0. { x } else { 0. })
}

/// Row-wise softmax over a batch of logits with shape (batch, classes).
/// The row maximum is subtracted before exponentiating to keep exp() finite.
pub fn softmax<'a, V>(logits: V) -> Array2<DataPrecision>
where
    V: AsArray<'a, DataPrecision, Ix2>,
{
    let logits: ArrayView2<DataPrecision> = logits.into();
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(DataPrecision::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }
    out
}

/// Activation applied elementwise after a layer's affine transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    LeakyRelu,
}

impl Activation {
    pub fn activate<D: Dimension>(&self, z: Array<DataPrecision, D>) -> Array<DataPrecision, D> {
        match self {
            Activation::Linear => z,
            Activation::Relu => relu(&z),
            Activation::LeakyRelu => leaky_relu(&z),
        }
    }

    /// Derivative of the activation, expressed in terms of the activation's *output*.
    /// All supported activations are monotone with a kink at zero, so the sign of the
    /// output is enough.
    pub fn derivative<D: Dimension>(
        &self,
        activated: &Array<DataPrecision, D>,
    ) -> Array<DataPrecision, D> {
        match self {
            Activation::Linear => Array::ones(activated.raw_dim()),
            Activation::Relu => activated.mapv(|a| if a > 0. { 1. } else { 0. }),
            Activation::LeakyRelu => {
                activated.mapv(|a| if a > 0. { 1. } else { LEAKY_RELU_SLOPE })
            }
        }
    }

    /// Short lowercase name, as shown in model summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::Relu => "relu",
            Activation::LeakyRelu => "leaky_relu",
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Linear
    }
}

/// Activation as a standalone, parameterless layer.
pub struct ActivationLayer {
    name: String,
    activation: Activation,
    output: Option<InternalDataRepresentation>,
}

impl ActivationLayer {
    pub fn new(name: String, activation: Activation) -> Self {
        Self {
            name,
            activation,
            output: None,
        }
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> ModelResult<Vec<usize>> {
        Ok(input_shape.to_vec())
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let out = self.activation.activate(input.clone());
        self.output = Some(out.clone());
        Ok(out)
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| ModelError::NoForwardPass(self.name.clone()))?;
        if output.shape() != grad_output.shape() {
            return Err(ModelError::shape(
                &self.name,
                output.shape(),
                grad_output.shape(),
            ));
        }
        Ok(grad_output * &self.activation.derivative(output))
    }

    fn parameters(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }
}
