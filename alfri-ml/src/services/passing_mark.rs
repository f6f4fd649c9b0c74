//! Passing-mark predictor
//!
//! Turns raw mark-model output into a normalized grade distribution:
//! - a scalar score in [0, 1] is bucketed into N equal-width bins and
//!   becomes a one-hot distribution
//! - a vector is normalized by its sum when it is non-negative with a
//!   positive sum, otherwise passed through a stable softmax
//!
//! If the first inference call fails the features are re-encoded as one-hot
//! grade blocks and inference is retried once.

use ndarray::Array2;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::features::{coerce_features, one_hot_encode, single_row};
use super::validation::{SubjectValidator, ValidationError};
use crate::inference::{InferenceError, LoadedModel, ModelOutput};
use crate::models::{GradeDistribution, PassingMarkResponse};
use crate::registry::ModelRegistry;

/// Default grade label order
pub const DEFAULT_GRADE_LABELS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("mark prediction failed for {subject}: {source}")]
    Inference {
        subject: String,
        #[source]
        source: InferenceError,
    },

    #[error("cannot interpret model output: {0}")]
    Output(String),
}

pub struct PassingMarkPredictor<'a> {
    registry: &'a ModelRegistry,
    validator: SubjectValidator,
}

impl<'a> PassingMarkPredictor<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            validator: SubjectValidator::default(),
        }
    }

    /// Predict the grade distribution for `subject`
    ///
    /// `subject` and `features` are the raw request fields.
    pub fn predict(
        &self,
        subject: Option<&Value>,
        features: Option<&Value>,
    ) -> Result<PassingMarkResponse, PredictionError> {
        let subject = self.validator.validate(subject)?;

        let Some(Value::Array(values)) = features else {
            return Err(ValidationError::new(
                "Invalid features: expected a list of numeric values",
            )
            .into());
        };

        let handle = self.registry.get_mark_model(subject).ok_or_else(|| {
            ValidationError::new(format!("No mark model for subject '{}'", subject))
        })?;

        if let Some(expected) = handle.descriptor.expected_input_length {
            if values.len() != expected {
                return Err(ValidationError::new(format!(
                    "Invalid feature length: expected {}, got {}",
                    expected,
                    values.len()
                ))
                .into());
            }
        }

        let x = coerce_features(values)
            .ok_or_else(|| ValidationError::new("features must be numeric"))?;

        let output = predict_with_fallback(handle.model, &x).map_err(|source| {
            warn!("Mark prediction failed for {}: {}", subject, source);
            PredictionError::Inference {
                subject: subject.to_string(),
                source,
            }
        })?;

        let custom_labels = handle.descriptor.grade_labels.as_deref();
        let bins = custom_labels
            .filter(|labels| !labels.is_empty())
            .map_or(DEFAULT_GRADE_LABELS.len(), <[String]>::len);

        let raw = interpret_output(&output, bins)?;
        let probabilities = normalize_distribution(&raw);
        let labels = grade_labels(probabilities.len(), custom_labels);
        let chosen = argmax(&probabilities);

        Ok(PassingMarkResponse {
            subject: subject.to_string(),
            chosen_grade: labels[chosen].clone(),
            distribution: GradeDistribution::new(labels, probabilities),
        })
    }
}

fn run_model(model: &LoadedModel, input: &Array2<f64>) -> Result<ModelOutput, InferenceError> {
    if model.capabilities().can_produce_probabilities {
        return model.predict_proba(input.view());
    }
    let labels = model.predict_label(input.view())?;
    Ok(ModelOutput::Vector(labels.into_iter().map(|l| l as f64).collect()))
}

/// Run inference, retrying once with one-hot re-encoded features on failure
pub fn predict_with_fallback(model: &LoadedModel, features: &[f64]) -> Result<ModelOutput, InferenceError> {
    match run_model(model, &single_row(features)) {
        Ok(output) => Ok(output),
        Err(first) => {
            warn!(
                "Initial prediction failed, retrying with one-hot encoding: {}",
                first
            );
            run_model(model, &single_row(&one_hot_encode(features)))
        }
    }
}

/// Interpret raw output as an (unnormalized) distribution
///
/// Single-valued outputs are scores and are bucketed into `bins` classes.
pub fn interpret_output(output: &ModelOutput, bins: usize) -> Result<Vec<f64>, PredictionError> {
    let row: Vec<f64> = match output {
        ModelOutput::Scalar(score) => vec![*score],
        ModelOutput::Vector(v) => v.clone(),
        ModelOutput::Matrix(m) => m
            .outer_iter()
            .next()
            .map(|r| r.to_vec())
            .unwrap_or_default(),
    };

    match row.as_slice() {
        [] => Err(PredictionError::Output("model returned no values".to_string())),
        _ if row.iter().any(|v| !v.is_finite()) => Err(PredictionError::Output(
            "model returned a non-finite value".to_string(),
        )),
        [score] => Ok(scalar_to_distribution(*score, bins)),
        _ => Ok(vector_to_distribution(&row)),
    }
}

/// One-hot distribution at the bucket containing `score`
///
/// Bin edges are `i / bins` for `i in 0..=bins`; the bucket is found with
/// right-side search semantics and clamped to the last bin, so a score of
/// exactly 1.0 lands in the last bucket.
pub fn scalar_to_distribution(score: f64, bins: usize) -> Vec<f64> {
    let bins = bins.max(1);
    let score = score.clamp(0.0, 1.0);
    let step = 1.0 / bins as f64;
    let at_or_below = (0..=bins).filter(|i| *i as f64 * step <= score).count();
    let index = at_or_below.saturating_sub(1).min(bins - 1);

    let mut probs = vec![0.0; bins];
    probs[index] = 1.0;
    probs
}

/// Sum-normalize non-negative vectors, softmax anything else
pub fn vector_to_distribution(values: &[f64]) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && values.iter().all(|v| *v >= 0.0) {
        return values.iter().map(|v| v / sum).collect();
    }
    softmax(values)
}

/// Numerically stable softmax
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Divide by the total; fall back to uniform when the total is not positive
pub fn normalize_distribution(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return vec![1.0 / n as f64; n];
    }
    values.iter().map(|v| v / total).collect()
}

/// Labels for an `n`-class distribution
///
/// Custom labels are used only when their count matches; otherwise the
/// default order is truncated, or extended with `G0`, `G1`, ...
pub fn grade_labels(n: usize, custom: Option<&[String]>) -> Vec<String> {
    if let Some(labels) = custom {
        if labels.len() == n {
            return labels.to_vec();
        }
    }
    let mut labels: Vec<String> = DEFAULT_GRADE_LABELS
        .iter()
        .take(n)
        .map(|l| l.to_string())
        .collect();
    labels.extend((0..n.saturating_sub(DEFAULT_GRADE_LABELS.len())).map(|i| format!("G{}", i)));
    labels
}

/// Index of the maximum, first index on ties
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{
        Activation, DenseLayerArtifact, FeedForwardNetwork, LogisticArtifact, LogisticModel,
        ModelEngine, NetworkArtifact,
    };
    use crate::models::{ModelDescriptor, ModelKind, ModelMap, ModelRole};
    use serde_json::json;

    /// Single sigmoid unit that emits exactly `score` for any 2-feature input
    fn constant_scalar_network(score: f64) -> ModelEngine {
        let logit = (score / (1.0 - score)).ln();
        ModelEngine::Network(
            FeedForwardNetwork::try_from(NetworkArtifact {
                layers: vec![DenseLayerArtifact {
                    weights: vec![vec![0.0], vec![0.0]],
                    bias: vec![logit],
                    activation: Activation::Sigmoid,
                }],
            })
            .unwrap(),
        )
    }

    /// Softmax network that only accepts one-hot encoded input (2 grades × 6)
    fn one_hot_network() -> ModelEngine {
        let mut weights = vec![vec![0.0; 3]; 12];
        weights[0][0] = 1.0;
        weights[6][1] = 1.0;
        ModelEngine::Network(
            FeedForwardNetwork::try_from(NetworkArtifact {
                layers: vec![DenseLayerArtifact {
                    weights,
                    bias: vec![],
                    activation: Activation::Softmax,
                }],
            })
            .unwrap(),
        )
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "scalar_mark",
                ModelDescriptor::new(ModelKind::Keras).with_role(ModelRole::Mark, "scalar"),
                constant_scalar_network(0.82),
            )
            .with_engine(
                "onehot_mark",
                ModelDescriptor::new(ModelKind::Keras)
                    .with_role(ModelRole::Mark, "onehot")
                    .with_grade_labels(["A", "B", "FX"]),
                one_hot_network(),
            )
            .with_engine(
                "logistic_mark",
                ModelDescriptor::new(ModelKind::Logistic)
                    .with_role(ModelRole::Mark, "logistic")
                    .with_expected_input_length(1),
                ModelEngine::Logistic(
                    LogisticModel::try_from(LogisticArtifact {
                        classes: vec![],
                        coef: vec![vec![1.0], vec![0.0], vec![-1.0]],
                        intercept: vec![0.0, 0.0, 0.0],
                        probability: true,
                    })
                    .unwrap(),
                ),
            )
            .load_all()
    }

    fn assert_distribution(response: &PassingMarkResponse) {
        assert!((response.distribution.total() - 1.0).abs() < 1e-6);
        let best = response
            .distribution
            .iter()
            .fold(f64::NEG_INFINITY, |acc, (_, p)| acc.max(p));
        assert_eq!(response.distribution.get(&response.chosen_grade), Some(best));
    }

    #[test]
    fn test_scalar_output_buckets_to_e() {
        let registry = registry();
        let response = PassingMarkPredictor::new(&registry)
            .predict(Some(&json!("scalar")), Some(&json!([1, 2])))
            .unwrap();
        assert_eq!(response.chosen_grade, "E");
        assert_eq!(response.distribution.len(), 6);
        assert_eq!(response.distribution.get("E"), Some(1.0));
        assert_distribution(&response);
    }

    #[test]
    fn test_one_hot_retry_recovers() {
        let registry = registry();
        // Raw [0, 1] has width 2; the network needs 12 → retry with one-hot
        let response = PassingMarkPredictor::new(&registry)
            .predict(Some(&json!("onehot")), Some(&json!([0, 1])))
            .unwrap();
        assert_eq!(response.distribution.len(), 3);
        assert!(response.distribution.get("FX").is_some());
        assert_distribution(&response);
    }

    #[test]
    fn test_probability_model_uses_default_labels() {
        let registry = registry();
        let response = PassingMarkPredictor::new(&registry)
            .predict(Some(&json!("logistic")), Some(&json!(["2.0"])))
            .unwrap();
        let labels: Vec<&str> = response.distribution.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
        assert_eq!(response.chosen_grade, "A");
        assert_distribution(&response);
    }

    #[test]
    fn test_validation_failures() {
        let registry = registry();
        let predictor = PassingMarkPredictor::new(&registry);
        let err = |s: Value, f: Value| predictor.predict(Some(&s), Some(&f)).unwrap_err();

        assert!(matches!(err(json!(""), json!([1])), PredictionError::Validation(_)));
        assert!(matches!(err(json!("scalar"), json!("1,2")), PredictionError::Validation(_)));
        assert!(matches!(err(json!("history"), json!([1])), PredictionError::Validation(_)));
        assert!(matches!(err(json!("logistic"), json!([1, 2])), PredictionError::Validation(_)));
        assert!(matches!(err(json!("logistic"), json!(["x"])), PredictionError::Validation(_)));
        assert!(matches!(
            predictor.predict(Some(&json!("scalar")), None),
            Err(PredictionError::Validation(_))
        ));
    }

    #[test]
    fn test_inference_failure_after_retry() {
        let registry = registry();
        // Width 3 fails raw (needs 2) and one-hot (18 ≠ 2)
        let err = PassingMarkPredictor::new(&registry)
            .predict(Some(&json!("scalar")), Some(&json!([1, 2, 3])))
            .unwrap_err();
        assert!(matches!(err, PredictionError::Inference { .. }));
    }

    #[test]
    fn test_scalar_bucketing_edges() {
        assert_eq!(argmax(&scalar_to_distribution(0.0, 6)), 0);
        assert_eq!(argmax(&scalar_to_distribution(0.82, 6)), 4);
        assert_eq!(argmax(&scalar_to_distribution(1.0, 6)), 5);
        assert_eq!(argmax(&scalar_to_distribution(1.7, 6)), 5);
        assert_eq!(argmax(&scalar_to_distribution(-0.3, 6)), 0);
        assert_eq!(argmax(&scalar_to_distribution(0.5, 2)), 1);
    }

    #[test]
    fn test_vector_normalization() {
        assert_eq!(vector_to_distribution(&[1.0, 3.0]), vec![0.25, 0.75]);
        let soft = vector_to_distribution(&[-1.0, 1.0]);
        assert!((soft.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(soft[1] > soft[0]);
        // All zeros: softmax gives uniform
        assert_eq!(vector_to_distribution(&[0.0, 0.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_uniform_fallback() {
        assert_eq!(normalize_distribution(&[0.0, 0.0, 0.0, 0.0]), vec![0.25; 4]);
    }

    #[test]
    fn test_grade_labels() {
        assert_eq!(grade_labels(3, None), vec!["A", "B", "C"]);
        assert_eq!(
            grade_labels(8, None),
            vec!["A", "B", "C", "D", "E", "F", "G0", "G1"]
        );
        let custom = vec!["1".to_string(), "2".to_string()];
        assert_eq!(grade_labels(2, Some(custom.as_slice())), vec!["1", "2"]);
        assert_eq!(grade_labels(3, Some(custom.as_slice())), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
    }
}
