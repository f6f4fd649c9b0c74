//! Subject data source abstraction
//!
//! The recommendation engine only needs two reads: every subject of a study
//! program with its focus vector, and a single subject by id. Production
//! reads PostgreSQL; offline deployments and tests use an in-memory catalog
//! loaded from subjects metadata files.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::models::{Subject, SubjectsMetadata};
use crate::{Error, Result};

/// Read-only access to subjects and their focus vectors
#[async_trait]
pub trait SubjectSource: Send + Sync {
    /// Source identifier for logs and health output
    fn source_id(&self) -> &'static str;

    /// All subjects of a study program, ordered by subject id
    async fn subjects_with_focus(&self, study_program_id: i64) -> Result<Vec<Subject>>;

    /// A single subject by id
    async fn subject_by_id(&self, subject_id: i64) -> Result<Option<Subject>>;
}

/// In-memory subject catalog keyed by study program
#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    programs: BTreeMap<i64, Vec<Subject>>,
}

impl SubjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the subjects of one study program
    pub fn insert_program(&mut self, study_program_id: i64, mut subjects: Vec<Subject>) {
        subjects.sort_by_key(|s| s.id);
        self.programs.insert(study_program_id, subjects);
    }

    pub fn with_program(mut self, study_program_id: i64, subjects: Vec<Subject>) -> Self {
        self.insert_program(study_program_id, subjects);
        self
    }

    /// Parse one subjects metadata document
    pub fn add_metadata_json(&mut self, json: &str) -> Result<i64> {
        let metadata: SubjectsMetadata = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid subjects metadata: {}", e)))?;
        let program = metadata.study_program_id;
        self.insert_program(program, metadata.subjects);
        Ok(program)
    }

    /// Load a set of subjects metadata files
    pub fn from_metadata_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut catalog = Self::new();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)?;
            let program = catalog.add_metadata_json(&content).map_err(|e| {
                Error::Config(format!("{}: {}", path.display(), e))
            })?;
            info!(
                "Loaded {} subjects for study program {} from {}",
                catalog.programs.get(&program).map(Vec::len).unwrap_or(0),
                program,
                path.display()
            );
        }
        Ok(catalog)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }
}

#[async_trait]
impl SubjectSource for SubjectCatalog {
    fn source_id(&self) -> &'static str {
        "catalog"
    }

    async fn subjects_with_focus(&self, study_program_id: i64) -> Result<Vec<Subject>> {
        Ok(self
            .programs
            .get(&study_program_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn subject_by_id(&self, subject_id: i64) -> Result<Option<Subject>> {
        Ok(self
            .programs
            .values()
            .flat_map(|subjects| subjects.iter())
            .find(|s| s.id == subject_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::FocusVector;

    fn subject(id: i64) -> Subject {
        Subject {
            id,
            name: format!("Subject {}", id),
            code: format!("S{:03}", id),
            abbreviation: None,
            focus_vector: FocusVector::new([id as f64; 12]),
        }
    }

    #[tokio::test]
    async fn test_catalog_orders_subjects_by_id() {
        let catalog = SubjectCatalog::new().with_program(3, vec![subject(5), subject(1)]);
        let subjects = catalog.subjects_with_focus(3).await.unwrap();
        let ids: Vec<i64> = subjects.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[tokio::test]
    async fn test_unknown_program_is_empty() {
        let catalog = SubjectCatalog::new();
        assert!(catalog.subjects_with_focus(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subject_by_id_searches_all_programs() {
        let catalog = SubjectCatalog::new()
            .with_program(3, vec![subject(1)])
            .with_program(4, vec![subject(7)]);
        assert_eq!(catalog.subject_by_id(7).await.unwrap().unwrap().id, 7);
        assert!(catalog.subject_by_id(8).await.unwrap().is_none());
    }

    #[test]
    fn test_metadata_json_ignores_extra_fields() {
        let json = r#"{
            "study_program_id": 4,
            "n_subjects": 1,
            "n_clusters": 6,
            "subjects": [{
                "id": 12,
                "name": "Accounting",
                "code": "MAN012",
                "abbreviation": "ACC",
                "cluster_label": 3,
                "focus_vector": [0,0,0,0,5,4,0,0,1,0,1,0]
            }]
        }"#;
        let mut catalog = SubjectCatalog::new();
        assert_eq!(catalog.add_metadata_json(json).unwrap(), 4);
        assert_eq!(catalog.program_count(), 1);
    }

    #[test]
    fn test_metadata_rejects_short_focus_vector() {
        let json = r#"{"study_program_id": 3, "subjects": [
            {"id": 1, "name": "x", "code": "y", "focus_vector": [1, 2, 3]}
        ]}"#;
        let mut catalog = SubjectCatalog::new();
        assert!(catalog.add_metadata_json(json).is_err());
    }
}
