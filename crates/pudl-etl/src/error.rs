//! Error types for the ETL

use crate::datastore::DatastoreError;
use pudl_common::PudlError;
use pudl_datapkg::DatapkgError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ETL orchestration
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors raised while configuring, wiring or running an ETL
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse settings: {0}")]
    Settings(#[from] serde_yaml::Error),

    #[error("Unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("Dataset dependency cycle: {0}")]
    DatasetCycle(String),

    #[error("Task graph contains a cycle through: {}", .0.join(", "))]
    GraphCycle(Vec<String>),

    #[error("Task '{0}' already exists in the graph")]
    DuplicateTask(String),

    #[error("Unknown task id {0}")]
    UnknownTask(usize),

    #[error(
        "{dataset} requires table '{table}' from {upstream}, which is not part of this run \
         and was not found under {}",
        .store.display()
    )]
    MissingPrerequisite {
        dataset: String,
        upstream: String,
        table: String,
        store: PathBuf,
    },

    #[error(
        "{} package(s) were not assembled: {}",
        .failed.len(),
        .failed.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    PackagesFailed {
        failed: Vec<PackageFailure>,
        /// Packages whose descriptors were written anyway
        published: Vec<String>,
    },

    #[error(transparent)]
    Datapkg(#[from] DatapkgError),

    #[error(transparent)]
    Common(#[from] PudlError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A package that produced no descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    pub package: String,
    /// Tasks of the package that failed or were skipped
    pub tasks: Vec<String>,
    /// Package whose failure kept this one from running
    pub blocked_by: Option<String>,
}

impl fmt::Display for PackageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.blocked_by {
            Some(upstream) => write!(f, "{} (blocked by {})", self.package, upstream),
            None => write!(f, "{} (failed: {})", self.package, self.tasks.join(", ")),
        }
    }
}

/// Failure of a single scheduled task
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Task panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No raw data found for {dataset} {context}")]
    NoRawData { dataset: String, context: String },

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error("Failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("No UTC offset known for plant {plant_id}")]
    MissingUtcOffset { plant_id: i64 },

    #[error("Invalid {column} value '{value}': {reason}")]
    InvalidValue {
        column: String,
        value: String,
        reason: String,
    },
}

/// Resource store read/write failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Resource '{0}' not found")]
    NotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
