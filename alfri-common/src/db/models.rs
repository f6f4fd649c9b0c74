//! Subject models

use serde::{Deserialize, Serialize};

use crate::focus::FocusVector;

/// A subject together with its focus profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub abbreviation: Option<String>,
    pub focus_vector: FocusVector,
}

/// Subjects metadata file for one study program
///
/// Produced offline from the subject database; cluster labels stored in the
/// file are ignored because labels are always predicted at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectsMetadata {
    pub study_program_id: i64,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}
