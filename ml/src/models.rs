use crate::{
    activation_functions::{Activation, ActivationLayer},
    convolutions::{Conv1dLayer, Padding},
    fully_connected::{FeedforwardLayer, FlattenLayer},
    initializers::Initializer,
    pooling::MaxPool1dLayer,
    DataPrecision, ModelError, ModelResult, WeightPrecision,
};
use log::debug;
use ndarray::*;
use rand::{rngs::StdRng, SeedableRng};
use serde_derive::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display};

/// Every layer consumes and produces dynamically shaped arrays, the leading axis
/// always being the batch.
pub type InternalDataRepresentation = ArrayD<DataPrecision>;

/// A trainable tensor together with the gradient of the last backward pass.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: ArrayD<WeightPrecision>,
    pub grad: ArrayD<WeightPrecision>,
}

impl Parameter {
    pub fn new(name: &str, value: ArrayD<WeightPrecision>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Self {
            name: name.to_string(),
            value,
            grad,
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// General layer trait.
///
/// `forward` caches whatever the matching `backward` needs. `backward` receives the
/// gradient of the loss with respect to the layer output, stores the parameter
/// gradients and returns the gradient with respect to the layer input.
pub trait Layer {
    fn name(&self) -> &str;

    fn layer_type(&self) -> &'static str {
        "Layer"
    }

    /// Output shape for a single example (batch axis excluded).
    fn output_shape(&self, input_shape: &[usize]) -> ModelResult<Vec<usize>>;

    fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation>;

    fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation>;

    fn parameters(&mut self) -> Vec<&mut Parameter>;

    fn parameter_count(&self) -> usize {
        0
    }
}

/// A linear stack of layers.
pub struct Sequential {
    input_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    /// Shape of one input example, batch axis excluded.
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn output_shape(&self) -> ModelResult<Vec<usize>> {
        self.layers
            .iter()
            .try_fold(self.input_shape.clone(), |shape, l| l.output_shape(&shape))
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn forward(
        &mut self,
        input: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        if input.ndim() != self.input_shape.len() + 1 || input.shape()[1..] != self.input_shape[..]
        {
            let mut expected = vec![input.shape().first().copied().unwrap_or(0)];
            expected.extend_from_slice(&self.input_shape);
            return Err(ModelError::shape("model input", &expected, input.shape()));
        }
        let mut activations = input.clone();
        for layer in self.layers.iter_mut() {
            activations = layer.forward(&activations)?;
        }
        Ok(activations)
    }

    pub fn backward(
        &mut self,
        grad_output: &InternalDataRepresentation,
    ) -> ModelResult<InternalDataRepresentation> {
        let mut grad = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(grad)
    }

    /// All trainable parameters, in layer order.
    pub fn parameters(&mut self) -> Vec<&mut Parameter> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.parameters())
            .collect()
    }

    /// Parameters keyed as "<layer>/<parameter>", e.g. "conv1d_0/kernel".
    pub fn named_parameters(&mut self) -> Vec<(String, &mut Parameter)> {
        let mut named = Vec::new();
        for layer in self.layers.iter_mut() {
            let layer_name = layer.name().to_string();
            for p in layer.parameters() {
                named.push((format!("{}/{}", layer_name, p.name), p));
            }
        }
        named
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    pub fn summary(&self) -> ModelResult<ModelSummary> {
        let mut rows = Vec::with_capacity(self.layers.len());
        let mut shape = self.input_shape.clone();
        for layer in &self.layers {
            shape = layer.output_shape(&shape)?;
            rows.push(SummaryRow {
                name: layer.name().to_string(),
                layer_type: layer.layer_type(),
                output_shape: shape.clone(),
                parameters: layer.parameter_count(),
            });
        }
        Ok(ModelSummary {
            input_shape: self.input_shape.clone(),
            rows,
        })
    }
}

/// Builds a `Sequential` model layer by layer, tracking the running shape so that
/// every layer can be initialised for its actual input.
pub struct SequentialBuilder {
    input_shape: Vec<usize>,
    current_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
    counters: HashMap<&'static str, usize>,
    rng: StdRng,
}

impl SequentialBuilder {
    pub fn new(input_shape: &[usize], seed: u64) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
            current_shape: input_shape.to_vec(),
            layers: Vec::new(),
            counters: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn next_name(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        let name = format!("{}_{}", prefix, counter);
        *counter += 1;
        name
    }

    fn require_rank(&self, rank: usize, layer: &str) -> ModelResult<()> {
        if self.current_shape.len() != rank {
            return Err(ModelError::InvalidArchitecture(format!(
                "{} expects inputs of rank {} per example, got shape {:?}",
                layer, rank, self.current_shape
            )));
        }
        Ok(())
    }

    /// Appends an arbitrary layer. Fails if the layer would produce an empty dimension.
    pub fn add(mut self, layer: Box<dyn Layer>) -> ModelResult<Self> {
        let shape = layer.output_shape(&self.current_shape)?;
        if shape.iter().any(|&d| d == 0) {
            return Err(ModelError::InvalidArchitecture(format!(
                "layer {} reduces input shape {:?} to {:?}",
                layer.name(),
                self.current_shape,
                shape
            )));
        }
        debug!("{}: {:?} -> {:?}", layer.name(), self.current_shape, shape);
        self.current_shape = shape;
        self.layers.push(layer);
        Ok(self)
    }

    pub fn conv1d(
        mut self,
        filters: usize,
        kernel_length: usize,
        activation: Activation,
        padding: Padding,
    ) -> ModelResult<Self> {
        self.require_rank(2, "Conv1D")?;
        let name = self.next_name("conv1d");
        let in_channels = self.current_shape[1];
        let kernel = Initializer::GlorotUniform.initialize(
            &[kernel_length, in_channels, filters],
            kernel_length * in_channels,
            kernel_length * filters,
            &mut self.rng,
        );
        let layer = Conv1dLayer::new(name, kernel, Array1::zeros(filters), activation, padding)?;
        self.add(Box::new(layer))
    }

    pub fn max_pool1d(mut self, pool_size: usize) -> ModelResult<Self> {
        self.require_rank(2, "MaxPooling1D")?;
        let name = self.next_name("max_pooling1d");
        self.add(Box::new(MaxPool1dLayer::new(name, pool_size)))
    }

    pub fn flatten(mut self) -> ModelResult<Self> {
        let name = self.next_name("flatten");
        self.add(Box::new(FlattenLayer::new(name)))
    }

    pub fn dense(
        mut self,
        units: usize,
        activation: Activation,
        initializer: Initializer,
    ) -> ModelResult<Self> {
        self.require_rank(1, "Dense")?;
        let name = self.next_name("dense");
        let inputs = self.current_shape[0];
        let weights = initializer.initialize(&[inputs, units], inputs, units, &mut self.rng);
        let layer = FeedforwardLayer::new(name, weights, Array1::zeros(units), activation)?;
        self.add(Box::new(layer))
    }

    pub fn activation(mut self, activation: Activation) -> ModelResult<Self> {
        let name = self.next_name(activation.name());
        self.add(Box::new(ActivationLayer::new(name, activation)))
    }

    pub fn build(self) -> Sequential {
        Sequential {
            input_shape: self.input_shape,
            layers: self.layers,
        }
    }
}

/// Shape parameters of the stacked convolutional regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressorLayout {
    /// Number of previous time steps seen per prediction.
    pub window_size: usize,
    pub filter_length: usize,
    pub num_input_series: usize,
    pub num_outputs: usize,
    /// Number of different filters to learn (roughly, input patterns to recognize).
    pub num_filters: usize,
    /// Number of Conv1D + MaxPooling1D blocks.
    pub num_blocks: usize,
    pub padding: Padding,
}

impl Default for RegressorLayout {
    fn default() -> Self {
        Self {
            window_size: 50,
            filter_length: 5,
            num_input_series: 1,
            num_outputs: 1,
            num_filters: 4,
            num_blocks: 5,
            padding: Padding::Same,
        }
    }
}

/// Stacked Conv1D(relu) / MaxPooling1D blocks, flattened into a single linear
/// dense layer that predicts the next value of every input series.
pub fn make_regressor(layout: &RegressorLayout, seed: u64) -> ModelResult<Sequential> {
    let mut builder =
        SequentialBuilder::new(&[layout.window_size, layout.num_input_series], seed);
    for _ in 0..layout.num_blocks {
        builder = builder
            .conv1d(
                layout.num_filters,
                layout.filter_length,
                Activation::Relu,
                layout.padding,
            )?
            .max_pool1d(2)?;
    }
    Ok(builder
        .flatten()?
        .dense(
            layout.num_outputs,
            Activation::Linear,
            Initializer::GlorotUniform,
        )?
        .build())
}

/// Single dense layer over flattened (steps, channels) inputs producing class logits.
/// Weights come from a truncated normal, biases start at zero.
pub fn make_classifier(
    steps: usize,
    channels: usize,
    num_classes: usize,
    seed: u64,
) -> ModelResult<Sequential> {
    Ok(SequentialBuilder::new(&[steps, channels], seed)
        .flatten()?
        .dense(
            num_classes,
            Activation::Linear,
            Initializer::TruncatedNormal { stddev: 1.0 },
        )?
        .build())
}

pub struct SummaryRow {
    pub name: String,
    pub layer_type: &'static str,
    pub output_shape: Vec<usize>,
    pub parameters: usize,
}

/// Keras-style overview of a model's layers.
pub struct ModelSummary {
    pub input_shape: Vec<usize>,
    pub rows: Vec<SummaryRow>,
}

impl ModelSummary {
    pub fn total_parameters(&self) -> usize {
        self.rows.iter().map(|r| r.parameters).sum()
    }

    pub fn output_shape(&self) -> &[usize] {
        self.rows
            .last()
            .map(|r| r.output_shape.as_slice())
            .unwrap_or(&self.input_shape)
    }
}

fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("(None, {})", dims.join(", "))
}

impl Display for ModelSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = "_".repeat(65);
        writeln!(f, "{}", rule)?;
        writeln!(f, "{:<32}{:<22}{:>11}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(65))?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<32}{:<22}{:>11}",
                format!("{} ({})", row.name, row.layer_type),
                format_shape(&row.output_shape),
                row.parameters
            )?;
        }
        writeln!(f, "{}", "=".repeat(65))?;
        write!(f, "Total params: {}", self.total_parameters())
    }
}
