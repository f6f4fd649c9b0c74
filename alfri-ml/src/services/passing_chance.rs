//! Passing-chance predictor
//!
//! Batch prediction of pass probabilities. Every subject in a batch is
//! processed independently; per-subject problems become structured
//! [`ItemError`]s in the result map and never fail the batch.

use ndarray::ArrayView2;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use super::features::{coerce_features, single_row};
use super::validation::SubjectValidator;
use crate::inference::{InferenceError, LoadedModel, ModelOutput};
use crate::models::{ChanceOutcome, ChanceResult, ItemError, ItemErrorCode};
use crate::registry::ModelRegistry;

/// Percentage string with two decimals, e.g. `0.25` → `"25.00%"`
pub fn format_percentage(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

pub struct PassingChancePredictor<'a> {
    registry: &'a ModelRegistry,
    validator: SubjectValidator,
}

impl<'a> PassingChancePredictor<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            validator: SubjectValidator::default(),
        }
    }

    /// Predict every subject of a `{subject: features}` mapping
    pub fn predict_batch(&self, subjects: &Map<String, Value>) -> BTreeMap<String, ChanceOutcome> {
        subjects
            .iter()
            .map(|(subject, features)| (subject.clone(), self.predict_subject(subject, features)))
            .collect()
    }

    /// Predict a single subject
    pub fn predict_subject(&self, subject: &str, features: &Value) -> ChanceOutcome {
        match self.try_predict(subject, features) {
            Ok(result) => ChanceOutcome::Prediction(result),
            Err(err) => ChanceOutcome::Error(err),
        }
    }

    fn try_predict(&self, subject: &str, features: &Value) -> Result<ChanceResult, ItemError> {
        self.validator
            .validate_str(subject)
            .map_err(|e| ItemError::new(ItemErrorCode::InvalidSubject, e.message))?;

        let handle = self.registry.get_chance_model(subject).ok_or_else(|| {
            ItemError::new(
                ItemErrorCode::ModelMissing,
                format!("No chance model for subject '{}'", subject),
            )
        })?;

        let Value::Array(values) = features else {
            return Err(ItemError::new(
                ItemErrorCode::InvalidFeatures,
                "features must be a list of numeric values",
            ));
        };

        if let Some(expected) = handle.descriptor.expected_input_length {
            if values.len() != expected {
                return Err(ItemError::new(
                    ItemErrorCode::InvalidFeatureLength,
                    format!("expected length {}, got {}", expected, values.len()),
                ));
            }
        }

        let x = coerce_features(values).ok_or_else(|| {
            ItemError::new(ItemErrorCode::InvalidFeatureValues, "features must be numeric")
        })?;

        let probability = positive_class_probability(handle.model, single_row(&x).view())
            .map_err(|e| {
                warn!("Chance prediction failed for {}: {}", subject, e.message);
                e
            })?
            .clamp(0.0, 1.0);

        Ok(ChanceResult {
            probability,
            percentage: format_percentage(probability),
        })
    }
}

/// Probability mass of the positive class
///
/// Uses the second column when two or more classes are present, otherwise the
/// last column. Label-only models map label truthiness to 1.0/0.0.
pub fn positive_class_probability(
    model: &LoadedModel,
    input: ArrayView2<f64>,
) -> Result<f64, ItemError> {
    let failed = |e: InferenceError| ItemError::new(ItemErrorCode::PredictionFailed, e.to_string());
    let capabilities = model.capabilities();

    if capabilities.can_produce_probabilities {
        let output = model.predict_proba(input).map_err(failed)?;
        return first_row_positive(&output).ok_or_else(|| {
            ItemError::new(
                ItemErrorCode::PredictionFailed,
                "model returned an empty probability vector",
            )
        });
    }

    if capabilities.can_produce_label {
        let labels = model.predict_label(input).map_err(failed)?;
        let label = labels.first().copied().ok_or_else(|| {
            ItemError::new(ItemErrorCode::PredictionFailed, "model returned no label")
        })?;
        return Ok(if label != 0 { 1.0 } else { 0.0 });
    }

    Err(ItemError::new(
        ItemErrorCode::ModelNoPredict,
        "Model has no predict or predict_proba method",
    ))
}

fn positive_column(row: &[f64]) -> Option<f64> {
    if row.len() >= 2 {
        Some(row[1])
    } else {
        row.last().copied()
    }
}

fn first_row_positive(output: &ModelOutput) -> Option<f64> {
    match output {
        ModelOutput::Scalar(p) => Some(*p),
        ModelOutput::Vector(v) => positive_column(v),
        ModelOutput::Matrix(m) => positive_column(&m.outer_iter().next()?.to_vec()),
    }
}
