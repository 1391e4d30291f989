//! Resource naming inside a data package directory
//!
//! Every resource lives in `<package>/data/`. Partitioned CEMS resources are
//! gzip compressed, everything else is plain CSV.

use crate::partition::EPACEMS_TABLE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Subdirectory of a package holding the resource files
pub const DATA_DIR: &str = "data";

/// File compression applied to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Compression used for a given resource name
    pub fn for_resource(resource_name: &str) -> Self {
        if resource_name.contains(EPACEMS_TABLE) {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    /// Data package `compression` value, if any
    pub fn descriptor_value(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

/// File name of a resource, e.g. `fuel_ferc1.csv` or
/// `hourly_emissions_epacems_2018_id.csv.gz`
pub fn file_name(resource_name: &str) -> String {
    match Compression::for_resource(resource_name) {
        Compression::None => format!("{}.csv", resource_name),
        Compression::Gzip => format!("{}.csv.gz", resource_name),
    }
}

/// Path of a resource relative to its package directory
pub fn relative_path(resource_name: &str) -> String {
    format!("{}/{}", DATA_DIR, file_name(resource_name))
}

/// Absolute path of a resource inside a package directory
pub fn absolute_path(package_dir: impl AsRef<Path>, resource_name: &str) -> PathBuf {
    package_dir.as_ref().join(DATA_DIR).join(file_name(resource_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(file_name("fuel_ferc1"), "fuel_ferc1.csv");
        assert_eq!(
            file_name("hourly_emissions_epacems_2018_id"),
            "hourly_emissions_epacems_2018_id.csv.gz"
        );
        assert_eq!(relative_path("plants_entity_eia"), "data/plants_entity_eia.csv");
    }

    #[test]
    fn test_absolute_path() {
        let path = absolute_path("/tmp/pkg", "hourly_emissions_epacems_2018_id");
        assert_eq!(path, PathBuf::from("/tmp/pkg/data/hourly_emissions_epacems_2018_id.csv.gz"));
    }

    #[test]
    fn test_compression() {
        assert_eq!(Compression::for_resource("utilities_eia"), Compression::None);
        assert_eq!(Compression::Gzip.descriptor_value(), Some("gz"));
        assert_eq!(Compression::None.descriptor_value(), None);
    }
}
