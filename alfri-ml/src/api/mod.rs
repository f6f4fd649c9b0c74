//! HTTP API handlers

pub mod clustering;
pub mod health;
pub mod models;
pub mod predictions;

pub use clustering::clustering_routes;
pub use health::health_routes;
pub use models::model_routes;
pub use predictions::prediction_routes;
