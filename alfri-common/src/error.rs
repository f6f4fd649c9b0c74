//! Errors shared by the ALFRI crates
//!
//! Only the failures this library raises itself: config files, subject data
//! and focus-vector input. HTTP mapping lives in the service.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Subject query against PostgreSQL failed
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file or environment override could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed focus vector or subjects metadata
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
