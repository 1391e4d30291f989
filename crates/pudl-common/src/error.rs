//! Error types for PUDL

use thiserror::Error;

/// Result type alias for PUDL operations
pub type Result<T> = std::result::Result<T, PudlError>;

/// Main error type shared by every PUDL crate
#[derive(Error, Debug)]
pub enum PudlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Invalid resource name: {0}")]
    InvalidResourceName(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
