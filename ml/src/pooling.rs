use crate::{
    models::{InternalDataRepresentation, Layer, Parameter},
    DataPrecision, ModelError, ModelResult,
};
use ndarray::*;

/// Max pooling over the steps axis of (batch, steps, channels) inputs.
/// Stride equals the pool size and trailing steps that don't fill a whole
/// window are dropped.
pub struct MaxPool1dLayer {
    name: String,
    pool_size: usize,
    /// For every output element, the step index of the maximum it was taken from.
    argmax: Option<(Array3<usize>, usize)>,
}

impl MaxPool1dLayer {
    pub fn new(name: String, pool_size: usize) -> Self {
        debug_assert!(pool_size > 0, "Pool size of 0 passed");
        Self {
            name,
            pool_size,
            argmax: None,
        }
    }
}

impl Layer for MaxPool1dLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_type(&self) -> &'static str {
        "MaxPooling1D"
    }

    fn output_shape(&self, input_shape: &[usize]) -> ModelResult<Vec<usize>> {
        match input_shape {
            [steps, channels] => Ok(vec![steps / self.pool_size, *channels]),
            _ => Err(ModelError::InvalidArchitecture(format!(
                "{} expects (steps, channels) inputs, got {:?}",
                self.name, input_shape
            ))),
        }
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let input = input.view().into_dimensionality::<Ix3>()?;
        let (batch, steps, channels) = input.dim();
        let pooled = steps / self.pool_size;

        let mut out = Array3::<DataPrecision>::zeros((batch, pooled, channels));
        let mut argmax = Array3::<usize>::zeros((batch, pooled, channels));
        for b in 0..batch {
            for p in 0..pooled {
                let start = p * self.pool_size;
                for c in 0..channels {
                    let mut best = start;
                    for t in start + 1..start + self.pool_size {
                        if input[[b, t, c]] > input[[b, best, c]] {
                            best = t;
                        }
                    }
                    out[[b, p, c]] = input[[b, best, c]];
                    argmax[[b, p, c]] = best;
                }
            }
        }

        self.argmax = Some((argmax, steps));
        Ok(out.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let (argmax, steps) = self
            .argmax
            .as_ref()
            .ok_or_else(|| ModelError::NoForwardPass(self.name.clone()))?;
        let grad_output = grad_output.view().into_dimensionality::<Ix3>()?;
        if grad_output.shape() != argmax.shape() {
            return Err(ModelError::shape(
                &self.name,
                argmax.shape(),
                grad_output.shape(),
            ));
        }

        let (batch, _, channels) = argmax.dim();
        let mut input_grad = Array3::zeros((batch, *steps, channels));
        for ((b, p, c), &t) in argmax.indexed_iter() {
            input_grad[[b, t, c]] += grad_output[[b, p, c]];
        }
        Ok(input_grad.into_dyn())
    }

    fn parameters(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }
}
