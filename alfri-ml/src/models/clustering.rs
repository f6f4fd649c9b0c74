//! Clustering and recommendation request/response types

use alfri_common::FocusVector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Candidate selection strategy for recommendations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendMethod {
    /// Only candidates sharing a cluster with the selection
    #[default]
    Cluster,
    /// All candidates, ranked by distance alone
    Distance,
}

impl RecommendMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cluster" => Some(RecommendMethod::Cluster),
            "distance" => Some(RecommendMethod::Distance),
            _ => None,
        }
    }
}

/// POST /api/v1/clustering/similar-subjects response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarSubjectsResponse {
    /// Echo of the request identifier (string or integer)
    #[serde(rename = "studyProgramId")]
    pub study_program_id: Value,
    pub offset_applied: i64,
    pub cluster_indices: Vec<i64>,
    pub centroid: Vec<f64>,
}

/// Subject with its predicted cluster label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteredSubject {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub abbreviation: Option<String>,
    pub focus_vector: FocusVector,
    pub cluster_label: i64,
    pub study_program_id: i64,
}

/// Selected subject summary inside a recommendation response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedSubject {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub cluster_label: i64,
}

/// One ranked recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub abbreviation: Option<String>,
    pub cluster_label: i64,
    pub similarity_score: f64,
    pub distance: f64,
}

/// POST /api/v1/clustering/recommend response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub study_program_id: i64,
    pub method: RecommendMethod,
    pub selected_subjects: Vec<SelectedSubject>,
    pub centroid: Vec<f64>,
    pub selected_clusters: Vec<i64>,
    pub recommendations: Vec<Recommendation>,
}

/// GET /api/v1/clustering/subjects/{id} response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSubjectsResponse {
    pub study_program_id: i64,
    pub n_subjects: usize,
    pub n_clusters: usize,
    pub focus_dimensions: Vec<&'static str>,
    pub subjects: Vec<ClusteredSubject>,
}

/// GET /api/v1/clustering/stats/{id} response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatsResponse {
    pub study_program_id: i64,
    pub n_subjects: usize,
    pub n_clusters: usize,
    pub cluster_distribution: BTreeMap<i64, usize>,
    pub focus_dimensions: Vec<&'static str>,
}

/// Query string for the subject listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectListQuery {
    pub cluster: Option<i64>,
}
