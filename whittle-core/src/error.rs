//! Error types for whittle

use thiserror::Error;

/// Main error type for whittle operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for whittle operations
pub type Result<T> = std::result::Result<T, Error>;
