//! Prediction request/response types

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Per-item failure codes reported inside a batch response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemErrorCode {
    InvalidSubject,
    ModelMissing,
    InvalidFeatures,
    InvalidFeatureLength,
    InvalidFeatureValues,
    PredictionFailed,
    ModelNoPredict,
}

impl ItemErrorCode {
    /// HTTP-style status reported with the item
    pub fn status(&self) -> u16 {
        match self {
            ItemErrorCode::PredictionFailed | ItemErrorCode::ModelNoPredict => 500,
            _ => 422,
        }
    }
}

/// Structured per-item error, e.g.
/// `{"status": 422, "error": "MODEL_MISSING", "message": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError {
    pub status: u16,
    pub error: ItemErrorCode,
    pub message: String,
}

impl ItemError {
    pub fn new(code: ItemErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            error: code,
            message: message.into(),
        }
    }
}

/// Successful pass-probability prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChanceResult {
    pub probability: f64,
    pub percentage: String,
}

/// Outcome for one subject of a batch request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChanceOutcome {
    Prediction(ChanceResult),
    Error(ItemError),
}

impl ChanceOutcome {
    pub fn probability(&self) -> Option<f64> {
        match self {
            ChanceOutcome::Prediction(result) => Some(result.probability),
            ChanceOutcome::Error(_) => None,
        }
    }

    pub fn error_code(&self) -> Option<ItemErrorCode> {
        match self {
            ChanceOutcome::Prediction(_) => None,
            ChanceOutcome::Error(err) => Some(err.error),
        }
    }
}

/// POST /api/v1/predictions/passing-chance response
#[derive(Debug, Clone, Serialize)]
pub struct PassingChanceResponse {
    pub results: BTreeMap<String, ChanceOutcome>,
}

/// Grade label → probability, serialized as a JSON object in label order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradeDistribution(Vec<(String, f64)>);

impl GradeDistribution {
    pub fn new(labels: Vec<String>, probabilities: Vec<f64>) -> Self {
        Self(labels.into_iter().zip(probabilities).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for GradeDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, probability) in &self.0 {
            map.serialize_entry(label, probability)?;
        }
        map.end()
    }
}

/// POST /api/v1/predictions/passing-mark response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassingMarkResponse {
    pub subject: String,
    pub distribution: GradeDistribution,
    pub chosen_grade: String,
}
