//! Model descriptors
//!
//! A descriptor is the static configuration telling the loader how to load a
//! model and telling the registry how to route requests to it. Descriptors
//! are read once at startup (TOML `[models.<name>]` tables and/or the
//! `MODEL_MAP` environment variable) and never change afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Model map: logical name → descriptor
pub type ModelMap = BTreeMap<String, ModelDescriptor>;

/// Artifact type tag
///
/// Unrecognised tags are kept as `Unknown` and go through generic
/// deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelKind {
    Logistic,
    Keras,
    KMeans,
    Unknown(String),
}

impl ModelKind {
    pub fn as_str(&self) -> &str {
        match self {
            ModelKind::Logistic => "logistic",
            ModelKind::Keras => "keras",
            ModelKind::KMeans => "kmeans",
            ModelKind::Unknown(tag) => tag,
        }
    }

    /// Neural-network artifacts need the dedicated loader and a warm-up pass
    pub fn is_neural(&self) -> bool {
        matches!(self, ModelKind::Keras)
    }
}

impl From<String> for ModelKind {
    fn from(tag: String) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "logistic" => ModelKind::Logistic,
            "keras" => ModelKind::Keras,
            "kmeans" => ModelKind::KMeans,
            _ => ModelKind::Unknown(tag),
        }
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction role of a model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelRole {
    /// Pass/fail probability
    Chance,
    /// Grade distribution
    Mark,
    Other(String),
}

impl ModelRole {
    pub fn as_str(&self) -> &str {
        match self {
            ModelRole::Chance => "chance",
            ModelRole::Mark => "mark",
            ModelRole::Other(role) => role,
        }
    }
}

impl From<String> for ModelRole {
    fn from(role: String) -> Self {
        match role.as_str() {
            "chance" => ModelRole::Chance,
            "mark" => ModelRole::Mark,
            _ => ModelRole::Other(role),
        }
    }
}

impl From<ModelRole> for String {
    fn from(role: ModelRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to load and route one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(rename = "type")]
    pub kind: ModelKind,

    /// Artifact path, absolute or relative to the models directory
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub role: Option<ModelRole>,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub study_program_id: Option<i64>,

    #[serde(
        default,
        rename = "expected_input_len",
        alias = "expected_input_length"
    )]
    pub expected_input_length: Option<usize>,

    #[serde(default)]
    pub grade_labels: Option<Vec<String>>,
}

impl ModelDescriptor {
    /// Bare descriptor of the given kind, for builders and tests
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            path: None,
            role: None,
            subject: None,
            study_program_id: None,
            expected_input_length: None,
            grade_labels: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_role(mut self, role: ModelRole, subject: impl Into<String>) -> Self {
        self.role = Some(role);
        self.subject = Some(subject.into());
        self
    }

    pub fn with_study_program(mut self, study_program_id: i64) -> Self {
        self.study_program_id = Some(study_program_id);
        self
    }

    pub fn with_expected_input_length(mut self, len: usize) -> Self {
        self.expected_input_length = Some(len);
        self
    }

    pub fn with_grade_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grade_labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_descriptors() {
        let toml_str = r#"
            [math101_chance]
            type = "logistic"
            path = "chance/math101.msgpack"
            role = "chance"
            subject = "math101"
            expected_input_len = 3

            [math101_mark]
            type = "keras"
            path = "mark/math101.json"
            role = "mark"
            subject = "math101"
            grade_labels = ["A", "B", "C", "D", "E", "FX"]

            [kmeans_management]
            type = "kmeans"
            path = "kmeans/management.msgpack"
            study_program_id = 4
        "#;

        let map: ModelMap = toml::from_str(toml_str).unwrap();
        assert_eq!(map.len(), 3);

        let chance = &map["math101_chance"];
        assert_eq!(chance.kind, ModelKind::Logistic);
        assert_eq!(chance.role, Some(ModelRole::Chance));
        assert_eq!(chance.subject.as_deref(), Some("math101"));
        assert_eq!(chance.expected_input_length, Some(3));

        let mark = &map["math101_mark"];
        assert!(mark.kind.is_neural());
        assert_eq!(mark.grade_labels.as_ref().map(Vec::len), Some(6));

        assert_eq!(map["kmeans_management"].study_program_id, Some(4));
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let descriptor: ModelDescriptor =
            serde_json::from_str(r#"{"type": "sklearn-pipeline", "path": "x.bin"}"#).unwrap();
        assert_eq!(
            descriptor.kind,
            ModelKind::Unknown("sklearn-pipeline".to_string())
        );
        assert_eq!(descriptor.kind.to_string(), "sklearn-pipeline");
    }

    #[test]
    fn test_expected_input_length_alias() {
        let descriptor: ModelDescriptor =
            serde_json::from_str(r#"{"type": "logistic", "expected_input_length": 5}"#).unwrap();
        assert_eq!(descriptor.expected_input_length, Some(5));
    }
}
