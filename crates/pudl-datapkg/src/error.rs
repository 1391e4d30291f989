//! Error types for data package assembly
//!
//! Every variant is fatal to the assembly of the package it occurred in; no
//! descriptor is written once one of these has been raised.

use pudl_common::PudlError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for data package operations
pub type Result<T> = std::result::Result<T, DatapkgError>;

#[derive(Error, Debug)]
pub enum DatapkgError {
    /// A resource or table name has no entry in the schema catalog
    #[error("'{0}' not found in the schema catalog")]
    TableNotFound(String),

    /// A resource or table name matches more than one catalog entry
    #[error("'{name}' found {count} times in the schema catalog")]
    AmbiguousTable { name: String, count: usize },

    #[error("Failed to parse schema catalog: {0}")]
    CatalogParse(String),

    #[error("Invalid tabular data resource descriptor '{name}': {}", .errors.join("; "))]
    InvalidResource { name: String, errors: Vec<String> },

    #[error("Invalid tabular data package '{name}': {}", .errors.join("; "))]
    InvalidPackage { name: String, errors: Vec<String> },

    /// Resource files do not conform to their declared schemas
    #[error("Data validation failed for package '{package}': {summary}")]
    DataValidation { package: String, summary: String },

    #[error("Got invalid type 4 UUID '{value}' as bundle ID for data package '{package}'")]
    InvalidBundleUuid { package: String, value: String },

    #[error("Got invalid DOI '{value}' as bundle DOI for data package '{package}'")]
    InvalidDoi { package: String, value: String },

    #[error("Resource file '{}' is unreadable: {source}", .path.display())]
    ResourceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Common(#[from] PudlError),
}

impl DatapkgError {
    /// Whether this is a catalog lookup failure (missing or ambiguous entry)
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::TableNotFound(_) | Self::AmbiguousTable { .. })
    }

    /// Whether this is a bundle UUID or DOI failure
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::InvalidBundleUuid { .. } | Self::InvalidDoi { .. })
    }
}
