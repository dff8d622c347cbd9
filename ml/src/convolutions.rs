use crate::{
    activation_functions::Activation,
    models::{InternalDataRepresentation, Layer, Parameter},
    DataPrecision, ModelError, ModelResult, WeightPrecision,
};
use ndarray::*;
use serde_derive::{Deserialize, Serialize};

/// Border handling of a convolution.
/// Valid: only positions where the kernel fits completely, output length shrinks by kernel_length - 1.
/// Same: zero-pad so that the output has the input length (stride is always 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Valid,
    Same,
}

impl Padding {
    /// Zeros added before and after the sequence.
    fn amounts(&self, kernel_length: usize) -> (usize, usize) {
        match self {
            Padding::Valid => (0, 0),
            Padding::Same => {
                let total = kernel_length - 1;
                (total / 2, total - total / 2)
            }
        }
    }
}

/// State the backward pass needs from the last forward pass.
struct ConvCache {
    /// One im2col matrix per batch element, shape (output length, kernel_length * in_channels)
    columns: Vec<Array2<DataPrecision>>,
    activated: Array3<DataPrecision>,
    input_steps: usize,
}

/// Rust implementation of a one dimensional convolutional layer with stride 1.
/// The kernel shall have dimension (in that order)
/// kernel length x input channels x filters
/// (to comply with the order in which keras weights are saved).
/// Inputs are batches in (batch, steps, channels) layout.
pub struct Conv1dLayer {
    name: String,
    kernel: Parameter,
    bias: Parameter,
    kernel_length: usize,
    in_channels: usize,
    filters: usize,
    activation: Activation,
    padding: Padding,
    cache: Option<ConvCache>,
}

impl Conv1dLayer {
    pub fn new(
        name: String,
        kernel: ArrayD<WeightPrecision>,
        bias: Array1<WeightPrecision>,
        activation: Activation,
        padding: Padding,
    ) -> ModelResult<Conv1dLayer> {
        if kernel.ndim() != 3 || kernel.shape()[0] == 0 {
            return Err(ModelError::InvalidArchitecture(format!(
                "{}: kernel must be (kernel_length, in_channels, filters), got {:?}",
                name,
                kernel.shape()
            )));
        }
        let kernel_length = kernel.shape()[0];
        let in_channels = kernel.shape()[1];
        let filters = kernel.shape()[2];
        if bias.len() != filters {
            return Err(ModelError::shape(&name, &[filters], bias.shape()));
        }

        Ok(Conv1dLayer {
            name,
            kernel: Parameter::new("kernel", kernel),
            bias: Parameter::new("bias", bias.into_dyn()),
            kernel_length,
            in_channels,
            filters,
            activation,
            padding,
            cache: None,
        })
    }

    pub fn kernel(&self) -> ArrayViewD<WeightPrecision> {
        self.kernel.value.view()
    }

    fn output_length(&self, steps: usize) -> usize {
        let (before, after) = self.padding.amounts(self.kernel_length);
        let padded = steps + before + after;
        if padded < self.kernel_length {
            0
        } else {
            padded - self.kernel_length + 1
        }
    }

    /// Kernel flattened to (kernel_length * in_channels, filters), matching the
    /// column order produced by `im2col`.
    fn kernel_matrix(&self) -> ModelResult<Array2<WeightPrecision>> {
        Ok(Array::from_shape_vec(
            (self.kernel_length * self.in_channels, self.filters),
            self.kernel.value.iter().cloned().collect(),
        )?)
    }

    fn pad<'a, V>(&self, sequence: V) -> Array2<DataPrecision>
    where
        V: AsArray<'a, DataPrecision, Ix2>,
    {
        let sequence: ArrayView2<DataPrecision> = sequence.into();
        let (before, after) = self.padding.amounts(self.kernel_length);
        let steps = sequence.len_of(Axis(0));
        let mut padded = Array2::zeros((steps + before + after, self.in_channels));
        padded
            .slice_mut(s![before..before + steps, ..])
            .assign(&sequence);
        padded
    }

    /// Unrolls every receptive field of the (already padded) sequence into a row,
    /// so the convolution becomes a single matrix product.
    fn im2col<'a, V>(&self, padded: V, output_length: usize) -> Array2<DataPrecision>
    where
        V: AsArray<'a, DataPrecision, Ix2>,
    {
        let padded: ArrayView2<DataPrecision> = padded.into();
        let mut columns = Array2::zeros((output_length, self.kernel_length * self.in_channels));
        for t in 0..output_length {
            let patch = padded.slice(s![t..t + self.kernel_length, ..]);
            for (dst, src) in columns.row_mut(t).iter_mut().zip(patch.iter()) {
                *dst = *src;
            }
        }
        columns
    }

    /// Inverse of `im2col` for gradients: overlapping patches are summed.
    fn col2im<'a, V>(&self, columns: V, padded_length: usize) -> Array2<DataPrecision>
    where
        V: AsArray<'a, DataPrecision, Ix2>,
    {
        let columns: ArrayView2<DataPrecision> = columns.into();
        let mut padded = Array2::zeros((padded_length, self.in_channels));
        for (t, row) in columns.outer_iter().enumerate() {
            for j in 0..self.kernel_length {
                for c in 0..self.in_channels {
                    padded[[t + j, c]] += row[j * self.in_channels + c];
                }
            }
        }
        padded
    }
}

impl Layer for Conv1dLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_type(&self) -> &'static str {
        "Conv1D"
    }

    fn output_shape(&self, input_shape: &[usize]) -> ModelResult<Vec<usize>> {
        match input_shape {
            [steps, channels] if *channels == self.in_channels => {
                Ok(vec![self.output_length(*steps), self.filters])
            }
            _ => Err(ModelError::shape(
                &self.name,
                &[input_shape.first().copied().unwrap_or(0), self.in_channels],
                input_shape,
            )),
        }
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let input = input.view().into_dimensionality::<Ix3>()?;
        let (batch, steps, channels) = input.dim();
        if channels != self.in_channels {
            return Err(ModelError::shape(
                &self.name,
                &[batch, steps, self.in_channels],
                input.shape(),
            ));
        }
        let output_length = self.output_length(steps);
        if output_length == 0 {
            return Err(ModelError::InvalidArchitecture(format!(
                "{}: sequence of length {} is shorter than the kernel",
                self.name, steps
            )));
        }

        let weights = self.kernel_matrix()?;
        let bias = self.bias.value.view().into_dimensionality::<Ix1>()?;
        let mut z = Array3::zeros((batch, output_length, self.filters));
        let mut columns = Vec::with_capacity(batch);
        for (b, sequence) in input.outer_iter().enumerate() {
            let cols = self.im2col(&self.pad(sequence), output_length);
            let mut z_b = z.index_axis_mut(Axis(0), b);
            z_b.assign(&cols.dot(&weights));
            z_b += &bias;
            columns.push(cols);
        }

        let activated = self.activation.activate(z);
        self.cache = Some(ConvCache {
            columns,
            activated: activated.clone(),
            input_steps: steps,
        });
        Ok(activated.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| ModelError::NoForwardPass(self.name.clone()))?;
        let grad_output = grad_output.view().into_dimensionality::<Ix3>()?;
        if grad_output.shape() != cache.activated.shape() {
            return Err(ModelError::shape(
                &self.name,
                cache.activated.shape(),
                grad_output.shape(),
            ));
        }

        let dz = &grad_output * &self.activation.derivative(&cache.activated);
        let weights = self.kernel_matrix()?;
        let (before, after) = self.padding.amounts(self.kernel_length);
        let padded_length = cache.input_steps + before + after;
        let batch = dz.len_of(Axis(0));

        let mut kernel_grad: Array2<WeightPrecision> = Array2::zeros(weights.raw_dim());
        let mut bias_grad: Array1<WeightPrecision> = Array1::zeros(self.filters);
        let mut input_grad = Array3::zeros((batch, cache.input_steps, self.in_channels));

        for (b, dz_b) in dz.outer_iter().enumerate() {
            let cols = &cache.columns[b];
            kernel_grad += &cols.t().dot(&dz_b);
            bias_grad += &dz_b.sum_axis(Axis(0));

            let dcols = dz_b.dot(&weights.t());
            let dpadded = self.col2im(&dcols, padded_length);
            input_grad
                .index_axis_mut(Axis(0), b)
                .assign(&dpadded.slice(s![before..before + cache.input_steps, ..]));
        }

        self.kernel.grad = kernel_grad.into_shape(self.kernel.value.raw_dim())?;
        self.bias.grad = bias_grad.into_dyn();
        Ok(input_grad.into_dyn())
    }

    fn parameters(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.kernel, &mut self.bias]
    }

    fn parameter_count(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }
}
