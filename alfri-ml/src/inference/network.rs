//! Feed-forward neural network (dense layers)
//!
//! Weights follow the Keras `Dense` layout: the kernel is `(inputs, units)`.
//! A network whose last layer has a single unit yields a scalar output for a
//! single-row input; wider networks yield a row matrix.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{InferenceError, ModelOutput};

/// Layer activation function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

/// Serialized dense layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayerArtifact {
    #[serde(alias = "kernel")]
    pub weights: Vec<Vec<f64>>,
    #[serde(default)]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

/// Serialized network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkArtifact {
    pub layers: Vec<DenseLayerArtifact>,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl DenseLayer {
    fn forward(&self, input: ArrayView2<f64>) -> Array2<f64> {
        let mut z = input.dot(&self.weights) + &self.bias;
        match self.activation {
            Activation::Linear => {}
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Softmax => {
                for mut row in z.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
        z
    }
}

/// Validated feed-forward network
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    layers: Vec<DenseLayer>,
}

impl TryFrom<NetworkArtifact> for FeedForwardNetwork {
    type Error = InferenceError;

    fn try_from(artifact: NetworkArtifact) -> Result<Self, Self::Error> {
        if artifact.layers.is_empty() {
            return Err(InferenceError::InvalidModel(
                "network has no layers".to_string(),
            ));
        }

        let mut layers = Vec::with_capacity(artifact.layers.len());
        let mut previous_units: Option<usize> = None;

        for (index, layer) in artifact.layers.into_iter().enumerate() {
            let inputs = layer.weights.len();
            let units = layer.weights.first().map(Vec::len).unwrap_or(0);
            if inputs == 0 || units == 0 || layer.weights.iter().any(|r| r.len() != units) {
                return Err(InferenceError::InvalidModel(format!(
                    "layer {} kernel must be a non-empty rectangular matrix",
                    index
                )));
            }
            if let Some(prev) = previous_units {
                if prev != inputs {
                    return Err(InferenceError::InvalidModel(format!(
                        "layer {} expects {} inputs but previous layer has {} units",
                        index, inputs, prev
                    )));
                }
            }
            let bias = if layer.bias.is_empty() {
                Array1::zeros(units)
            } else if layer.bias.len() == units {
                Array1::from_vec(layer.bias)
            } else {
                return Err(InferenceError::InvalidModel(format!(
                    "layer {} has {} units but {} biases",
                    index,
                    units,
                    layer.bias.len()
                )));
            };

            let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
            let weights = Array2::from_shape_vec((inputs, units), flat)
                .map_err(|e| InferenceError::InvalidModel(e.to_string()))?;

            layers.push(DenseLayer {
                weights,
                bias,
                activation: layer.activation,
            });
            previous_units = Some(units);
        }

        Ok(Self { layers })
    }
}

impl FeedForwardNetwork {
    /// Width of the input layer
    pub fn input_width(&self) -> usize {
        self.layers[0].weights.nrows()
    }

    /// Width of the output layer
    pub fn output_width(&self) -> usize {
        self.layers[self.layers.len() - 1].weights.ncols()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Run the forward pass
    pub fn predict(&self, input: ArrayView2<f64>) -> Result<ModelOutput, InferenceError> {
        if input.nrows() == 0 {
            return Err(InferenceError::EmptyInput);
        }
        if input.ncols() != self.input_width() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.input_width(),
                got: input.ncols(),
            });
        }

        let mut activations = self.layers[0].forward(input);
        for layer in &self.layers[1..] {
            activations = layer.forward(activations.view());
        }

        if activations.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::Numeric(
                "network produced a non-finite activation".to_string(),
            ));
        }

        if activations.dim() == (1, 1) {
            return Ok(ModelOutput::Scalar(activations[[0, 0]]));
        }
        Ok(ModelOutput::Matrix(activations))
    }
}
