//! Raw input datastore
//!
//! Downloading from EIA and EPA is out of scope; a [`Datastore`] serves raw
//! files that are already on disk, keyed by dataset and file name.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error("{dataset}/{file} is not in the datastore")]
    NotFound { dataset: String, file: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DatastoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatastoreError::NotFound { .. })
    }
}

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Fetch the raw bytes of one file of a dataset
    async fn fetch(&self, dataset: &str, file_name: &str) -> Result<Vec<u8>, DatastoreError>;
}

/// Datastore laid out as `<root>/data/<dataset>/<file>`
#[derive(Debug, Clone)]
pub struct LocalDatastore {
    root: PathBuf,
}

impl LocalDatastore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, dataset: &str, file_name: &str) -> PathBuf {
        self.root.join("data").join(dataset).join(file_name)
    }
}

#[async_trait]
impl Datastore for LocalDatastore {
    async fn fetch(&self, dataset: &str, file_name: &str) -> Result<Vec<u8>, DatastoreError> {
        let path = self.path(dataset, file_name);
        debug!(path = %path.display(), "Reading raw file");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DatastoreError::NotFound {
                dataset: dataset.to_string(),
                file: file_name.to_string(),
            }),
            Err(source) => Err(DatastoreError::Io { path, source }),
        }
    }
}
