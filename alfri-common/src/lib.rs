//! # ALFRI Common Library
//!
//! Shared code for the ALFRI student-advising services:
//! - Error and result types
//! - Configuration file resolution
//! - Focus vectors (12-dimension subject profiles)
//! - Subject models and the subject data source

pub mod config;
pub mod db;
pub mod error;
pub mod focus;

pub use error::{Error, Result};
pub use focus::{FocusVector, FOCUS_DIMENSIONS, FOCUS_DIMENSION_COUNT};
