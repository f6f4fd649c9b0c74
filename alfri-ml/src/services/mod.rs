//! Prediction and clustering services
//!
//! Services are synchronous and operate on a borrowed [`ModelRegistry`];
//! HTTP handlers call them from blocking tasks.
//!
//! [`ModelRegistry`]: crate::registry::ModelRegistry

pub mod clustering;
pub mod features;
pub mod passing_chance;
pub mod passing_mark;
pub mod recommendation;
pub mod validation;

pub use clustering::{ClusteringError, DirectClustering, StudyProgramRef};
pub use passing_chance::PassingChancePredictor;
pub use passing_mark::{PassingMarkPredictor, PredictionError};
pub use recommendation::{recommend, RecommendParams};
pub use validation::{SubjectValidator, ValidationError};
