//! Logistic regression classifier
//!
//! Mirrors the layout of a fitted scikit-learn `LogisticRegression`:
//! `coef` has one row for binary problems (positive-class logit) and one row
//! per class for multinomial problems.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{InferenceError, ModelOutput};

fn default_true() -> bool {
    true
}

/// Serialized form of a logistic regression model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticArtifact {
    /// Class labels in column order; defaults to `0..n_classes`
    #[serde(default, alias = "classes_")]
    pub classes: Vec<i64>,
    #[serde(alias = "coef_")]
    pub coef: Vec<Vec<f64>>,
    #[serde(alias = "intercept_")]
    pub intercept: Vec<f64>,
    /// When false the model only produces labels
    #[serde(default = "default_true")]
    pub probability: bool,
}

/// Validated logistic regression model
#[derive(Debug, Clone)]
pub struct LogisticModel {
    classes: Vec<i64>,
    coef: Array2<f64>,
    intercept: Array1<f64>,
    probability: bool,
}

impl TryFrom<LogisticArtifact> for LogisticModel {
    type Error = InferenceError;

    fn try_from(artifact: LogisticArtifact) -> Result<Self, Self::Error> {
        let rows = artifact.coef.len();
        if rows == 0 {
            return Err(InferenceError::InvalidModel(
                "logistic model has no coefficients".to_string(),
            ));
        }
        let width = artifact.coef[0].len();
        if width == 0 || artifact.coef.iter().any(|r| r.len() != width) {
            return Err(InferenceError::InvalidModel(
                "logistic coefficient rows must be non-empty and equally sized".to_string(),
            ));
        }
        if artifact.intercept.len() != rows {
            return Err(InferenceError::InvalidModel(format!(
                "expected {} intercepts, got {}",
                rows,
                artifact.intercept.len()
            )));
        }

        let n_classes = if rows == 1 { 2 } else { rows };
        let classes = if artifact.classes.is_empty() {
            (0..n_classes as i64).collect()
        } else if artifact.classes.len() == n_classes {
            artifact.classes
        } else {
            return Err(InferenceError::InvalidModel(format!(
                "expected {} class labels, got {}",
                n_classes,
                artifact.classes.len()
            )));
        };

        let flat: Vec<f64> = artifact.coef.into_iter().flatten().collect();
        let coef = Array2::from_shape_vec((rows, width), flat)
            .map_err(|e| InferenceError::InvalidModel(e.to_string()))?;

        Ok(Self {
            classes,
            coef,
            intercept: Array1::from_vec(artifact.intercept),
            probability: artifact.probability,
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticModel {
    pub fn n_features(&self) -> usize {
        self.coef.ncols()
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn supports_probability(&self) -> bool {
        self.probability
    }

    fn decision_function(&self, input: ArrayView2<f64>) -> Result<Array2<f64>, InferenceError> {
        if input.nrows() == 0 {
            return Err(InferenceError::EmptyInput);
        }
        if input.ncols() != self.n_features() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.n_features(),
                got: input.ncols(),
            });
        }
        Ok(input.dot(&self.coef.t()) + &self.intercept)
    }

    /// Per-class probabilities, one row per sample
    pub fn predict_proba(&self, input: ArrayView2<f64>) -> Result<ModelOutput, InferenceError> {
        if !self.probability {
            return Err(InferenceError::NotSupported("predict_proba"));
        }
        let scores = self.decision_function(input)?;

        let proba = if self.coef.nrows() == 1 {
            let mut out = Array2::zeros((scores.nrows(), 2));
            for (i, z) in scores.column(0).iter().enumerate() {
                let p = sigmoid(*z);
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            }
            out
        } else {
            let mut out = scores;
            for mut row in out.axis_iter_mut(Axis(0)) {
                let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|v| v / sum);
            }
            out
        };

        Ok(ModelOutput::Matrix(proba))
    }

    /// Predicted class label per sample
    pub fn predict_label(&self, input: ArrayView2<f64>) -> Result<Vec<i64>, InferenceError> {
        let scores = self.decision_function(input)?;

        if self.coef.nrows() == 1 {
            return Ok(scores
                .column(0)
                .iter()
                .map(|z| if *z > 0.0 { self.classes[1] } else { self.classes[0] })
                .collect());
        }

        Ok(scores
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = 0;
                for (i, v) in row.iter().enumerate() {
                    if *v > row[best] {
                        best = i;
                    }
                }
                self.classes[best]
            })
            .collect())
    }
}
