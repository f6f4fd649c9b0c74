//! Inference engines and the loaded-model wrapper
//!
//! Every loaded model is a [`LoadedModel`]: one of the engines below plus the
//! capability flags resolved at load time and an [`InferenceGate`] deciding
//! whether inference must hold the registry's exclusive lock.

pub mod codec;
pub mod kmeans;
pub mod logistic;
pub mod network;

use ndarray::{Array2, ArrayView2};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use kmeans::{KMeansArtifact, KMeansModel};
pub use logistic::{LogisticArtifact, LogisticModel};
pub use network::{Activation, DenseLayerArtifact, FeedForwardNetwork, NetworkArtifact};

/// Inference failure inside a single model call
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("expected {expected} input features, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("input has no rows")]
    EmptyInput,

    #[error("model does not support {0}")]
    NotSupported(&'static str),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("numeric error: {0}")]
    Numeric(String),
}

/// Raw model output before interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// 0-dimensional output
    Scalar(f64),
    /// 1-D output
    Vector(Vec<f64>),
    /// One row per input sample
    Matrix(Array2<f64>),
}

/// What a loaded model can produce, resolved once at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_produce_probabilities: bool,
    pub can_produce_label: bool,
}

/// Inference engine variants
#[derive(Debug, Clone)]
pub enum ModelEngine {
    Logistic(LogisticModel),
    Network(FeedForwardNetwork),
    KMeans(KMeansModel),
}

impl ModelEngine {
    pub fn engine_name(&self) -> &'static str {
        match self {
            ModelEngine::Logistic(_) => "logistic",
            ModelEngine::Network(_) => "network",
            ModelEngine::KMeans(_) => "kmeans",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            ModelEngine::Logistic(m) => Capabilities {
                can_produce_probabilities: m.supports_probability(),
                can_produce_label: !m.classes().is_empty(),
            },
            ModelEngine::Network(_) => Capabilities {
                can_produce_probabilities: true,
                can_produce_label: false,
            },
            ModelEngine::KMeans(_) => Capabilities {
                can_produce_probabilities: false,
                can_produce_label: true,
            },
        }
    }

    /// Neural inference is not safe to run concurrently
    pub fn requires_exclusive_inference(&self) -> bool {
        matches!(self, ModelEngine::Network(_))
    }

    /// Width of the input rows the engine accepts
    pub fn input_width(&self) -> usize {
        match self {
            ModelEngine::Logistic(m) => m.n_features(),
            ModelEngine::Network(n) => n.input_width(),
            ModelEngine::KMeans(k) => k.dims(),
        }
    }
}

/// Serialization wrapper around inference calls
///
/// `Exclusive` models share the registry's single mutex; `Concurrent`
/// models run without taking any lock.
#[derive(Debug, Clone)]
pub enum InferenceGate {
    Exclusive(Arc<Mutex<()>>),
    Concurrent,
}

impl InferenceGate {
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        match self {
            InferenceGate::Exclusive(lock) => {
                // The mutex guards no data, so a poisoned lock is still usable
                let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f()
            }
            InferenceGate::Concurrent => f(),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, InferenceGate::Exclusive(_))
    }
}

/// A model owned by the registry, immutable after load
#[derive(Debug, Clone)]
pub struct LoadedModel {
    engine: ModelEngine,
    capabilities: Capabilities,
    gate: InferenceGate,
}

impl LoadedModel {
    /// Wrap an engine, attaching `lock` when its inference must be serialized
    pub fn new(engine: ModelEngine, lock: &Arc<Mutex<()>>) -> Self {
        let gate = if engine.requires_exclusive_inference() {
            InferenceGate::Exclusive(Arc::clone(lock))
        } else {
            InferenceGate::Concurrent
        };
        Self {
            capabilities: engine.capabilities(),
            engine,
            gate,
        }
    }

    pub fn engine(&self) -> &ModelEngine {
        &self.engine
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn gate(&self) -> &InferenceGate {
        &self.gate
    }

    pub fn as_kmeans(&self) -> Option<&KMeansModel> {
        match &self.engine {
            ModelEngine::KMeans(k) => Some(k),
            _ => None,
        }
    }

    /// Probability-producing inference (network forward pass or class
    /// probabilities)
    pub fn predict_proba(&self, input: ArrayView2<f64>) -> Result<ModelOutput, InferenceError> {
        if !self.capabilities.can_produce_probabilities {
            return Err(InferenceError::NotSupported("predict_proba"));
        }
        self.gate.run(|| match &self.engine {
            ModelEngine::Logistic(m) => m.predict_proba(input),
            ModelEngine::Network(n) => n.predict(input),
            ModelEngine::KMeans(_) => Err(InferenceError::NotSupported("predict_proba")),
        })
    }

    /// Label-producing inference (class label or cluster index)
    pub fn predict_label(&self, input: ArrayView2<f64>) -> Result<Vec<i64>, InferenceError> {
        if !self.capabilities.can_produce_label {
            return Err(InferenceError::NotSupported("predict"));
        }
        self.gate.run(|| match &self.engine {
            ModelEngine::Logistic(m) => m.predict_label(input),
            ModelEngine::KMeans(k) => k.predict(input),
            ModelEngine::Network(_) => Err(InferenceError::NotSupported("predict")),
        })
    }
}
