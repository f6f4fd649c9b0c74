//! Data models for alfri-ml
//!
//! - Model descriptors (static routing/loading configuration)
//! - Prediction and clustering response types

pub mod clustering;
pub mod descriptor;
pub mod prediction;

pub use clustering::{
    ClusterStatsResponse, ClusteredSubject, ProgramSubjectsResponse, RecommendMethod,
    Recommendation, RecommendationResponse, SelectedSubject, SimilarSubjectsResponse,
    SubjectListQuery,
};
pub use descriptor::{ModelDescriptor, ModelKind, ModelMap, ModelRole};
pub use prediction::{
    ChanceOutcome, ChanceResult, GradeDistribution, ItemError, ItemErrorCode,
    PassingChanceResponse, PassingMarkResponse,
};
