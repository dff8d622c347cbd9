use crate::{
    activation_functions::Activation,
    models::{InternalDataRepresentation, Layer, Parameter},
    DataPrecision, ModelError, ModelResult, WeightPrecision,
};
use ndarray::*;

/// Rust implementation of a feed forward layer.
/// The weight matrix shall have dimension (in that order)
/// input units x output units (to comply with the order in which keras weights are saved).
pub struct FeedforwardLayer {
    name: String,
    weights: Parameter,
    bias: Parameter,
    input_dimension: usize,
    output_dimension: usize,
    activation: Activation,
    /// Input and activated output of the last forward pass
    cache: Option<(Array2<DataPrecision>, Array2<DataPrecision>)>,
}

impl FeedforwardLayer {
    pub fn new(
        name: String,
        weights: ArrayD<WeightPrecision>,
        bias: Array1<WeightPrecision>,
        activation: Activation,
    ) -> ModelResult<FeedforwardLayer> {
        if weights.ndim() != 2 {
            return Err(ModelError::InvalidArchitecture(format!(
                "{}: weights must be (inputs, units), got {:?}",
                name,
                weights.shape()
            )));
        }
        let input_dimension = weights.shape()[0];
        let output_dimension = weights.shape()[1];
        if bias.len() != output_dimension {
            return Err(ModelError::shape(&name, &[output_dimension], bias.shape()));
        }
        Ok(FeedforwardLayer {
            name,
            weights: Parameter::new("kernel", weights),
            bias: Parameter::new("bias", bias.into_dyn()),
            input_dimension,
            output_dimension,
            activation,
            cache: None,
        })
    }

    fn weight_matrix(&self) -> ModelResult<ArrayView2<WeightPrecision>> {
        Ok(self.weights.value.view().into_dimensionality::<Ix2>()?)
    }

    /// Forward pass for a batch of shape (batch, input units), no caching.
    pub fn forward_pass<'a, V>(&self, data: V) -> ModelResult<Array2<DataPrecision>>
    where
        V: AsArray<'a, DataPrecision, Ix2>,
    {
        let data_arr: ArrayView2<DataPrecision> = data.into();
        if data_arr.len_of(Axis(1)) != self.input_dimension {
            return Err(ModelError::shape(
                &self.name,
                &[data_arr.len_of(Axis(0)), self.input_dimension],
                data_arr.shape(),
            ));
        }
        let bias = self.bias.value.view().into_dimensionality::<Ix1>()?;
        let z = data_arr.dot(&self.weight_matrix()?) + &bias;
        Ok(self.activation.activate(z))
    }
}

impl Layer for FeedforwardLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_type(&self) -> &'static str {
        "Dense"
    }

    fn output_shape(&self, input_shape: &[usize]) -> ModelResult<Vec<usize>> {
        if input_shape != [self.input_dimension] {
            return Err(ModelError::shape(
                &self.name,
                &[self.input_dimension],
                input_shape,
            ));
        }
        Ok(vec![self.output_dimension])
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let input = input.view().into_dimensionality::<Ix2>()?;
        let out = self.forward_pass(&input)?;
        self.cache = Some((input.to_owned(), out.clone()));
        Ok(out.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let (input, activated) = self
            .cache
            .as_ref()
            .ok_or_else(|| ModelError::NoForwardPass(self.name.clone()))?;
        let grad_output = grad_output.view().into_dimensionality::<Ix2>()?;
        if grad_output.shape() != activated.shape() {
            return Err(ModelError::shape(
                &self.name,
                activated.shape(),
                grad_output.shape(),
            ));
        }

        let dz = &grad_output * &self.activation.derivative(activated);
        let input_grad = dz.dot(&self.weight_matrix()?.t());
        let weight_grad = input.t().dot(&dz);
        let bias_grad = dz.sum_axis(Axis(0));

        self.weights.grad = weight_grad.into_dyn();
        self.bias.grad = bias_grad.into_dyn();
        Ok(input_grad.into_dyn())
    }

    fn parameters(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// Collapses everything but the batch axis.
pub struct FlattenLayer {
    name: String,
    input_shape: Option<Vec<usize>>,
}

impl FlattenLayer {
    pub fn new(name: String) -> Self {
        Self {
            name,
            input_shape: None,
        }
    }
}

impl Layer for FlattenLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_type(&self) -> &'static str {
        "Flatten"
    }

    fn output_shape(&self, input_shape: &[usize]) -> ModelResult<Vec<usize>> {
        Ok(vec![input_shape.iter().product()])
    }

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let batch = input.shape().first().copied().unwrap_or(0);
        let features = input.shape()[1..].iter().product::<usize>();
        self.input_shape = Some(input.shape().to_vec());
        let flat = input
            .as_standard_layout()
            .into_owned()
            .into_shape((batch, features))?;
        Ok(flat.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let shape = self
            .input_shape
            .as_ref()
            .ok_or_else(|| ModelError::NoForwardPass(self.name.clone()))?;
        let grad = grad_output
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(shape))?;
        Ok(grad)
    }

    fn parameters(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }
}
