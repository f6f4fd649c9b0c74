//! Request input validation

use serde_json::{json, Value};
use thiserror::Error;

/// Subject identifiers must be 1..=128 characters
pub const SUBJECT_MIN_LEN: usize = 1;
pub const SUBJECT_MAX_LEN: usize = 128;

/// Malformed, missing or out-of-range input
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub details: Option<Value>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validates the `subject` field of prediction requests
#[derive(Debug, Clone, Copy)]
pub struct SubjectValidator {
    min_len: usize,
    max_len: usize,
}

impl Default for SubjectValidator {
    fn default() -> Self {
        Self {
            min_len: SUBJECT_MIN_LEN,
            max_len: SUBJECT_MAX_LEN,
        }
    }
}

impl SubjectValidator {
    /// Validate a raw JSON value, returning the subject string
    pub fn validate<'a>(&self, subject: Option<&'a Value>) -> Result<&'a str, ValidationError> {
        match subject {
            None => Err(ValidationError::new("Missing required field: subject")
                .with_details(json!({"field": "subject"}))),
            Some(Value::Null) => Err(ValidationError::new("subject cannot be null")
                .with_details(json!({"field": "subject"}))),
            Some(Value::String(s)) => {
                self.validate_str(s)?;
                Ok(s.as_str())
            }
            Some(other) => Err(ValidationError::new("subject must be a string").with_details(
                json!({"field": "subject", "type": json_type_name(other)}),
            )),
        }
    }

    /// Length check, counted in characters
    pub fn validate_str(&self, subject: &str) -> Result<(), ValidationError> {
        let length = subject.chars().count();
        if length < self.min_len || length > self.max_len {
            return Err(ValidationError::new(format!(
                "subject must be between {} and {} characters",
                self.min_len, self.max_len
            ))
            .with_details(json!({
                "field": "subject",
                "min_len": self.min_len,
                "max_len": self.max_len,
                "actual_len": length,
            })));
        }
        Ok(())
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
