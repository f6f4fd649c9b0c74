//! Subject models and data sources

pub mod models;
#[cfg(feature = "sqlx")]
pub mod postgres;
pub mod source;

pub use models::*;
#[cfg(feature = "sqlx")]
pub use postgres::PgSubjectStore;
pub use source::{SubjectCatalog, SubjectSource};
