//! Tabular data resource descriptors
//!
//! A descriptor is the catalog entry for the resource's table, renamed to the
//! resource and completed with facts about the file actually on disk. Size
//! and hash are recomputed every time a descriptor is built.

use crate::catalog::{Schema, SchemaCatalog};
use crate::coverage::Coverage;
use crate::error::{DatapkgError, Result};
use crate::foreign_keys::ForeignKeyGraph;
use crate::settings::DatapkgSettings;
use crate::sources::{self, Source};
use crate::validate;
use chrono::Utc;
use pudl_common::checksum;
use pudl_common::resource::{self as naming, Compression};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const RESOURCE_PROFILE: &str = "tabular-data-resource";

/// Timestamp format of `created` fields, UTC with second precision
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn created_now() -> String {
    Utc::now().format(CREATED_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub profile: String,
    pub name: String,
    /// Relative to the package directory
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub format: String,
    pub mediatype: String,
    pub encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    pub bytes: u64,
    pub hash: String,
    pub created: String,
    pub schema: Schema,
    pub sources: Vec<Source>,
    pub coverage: Coverage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl ResourceDescriptor {
    /// Table this resource holds rows of
    pub fn table(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.name)
    }

    pub fn is_gzipped(&self) -> bool {
        self.compression.as_deref() == Compression::Gzip.descriptor_value()
    }
}

/// Builds validated descriptors for the resources of one package
pub struct ResourceBuilder<'a> {
    catalog: &'a SchemaCatalog,
    fk_graph: &'a ForeignKeyGraph,
    settings: &'a DatapkgSettings,
    package_dir: &'a Path,
}

impl<'a> ResourceBuilder<'a> {
    pub fn new(
        catalog: &'a SchemaCatalog,
        fk_graph: &'a ForeignKeyGraph,
        settings: &'a DatapkgSettings,
        package_dir: &'a Path,
    ) -> Self {
        Self {
            catalog,
            fk_graph,
            settings,
            package_dir,
        }
    }

    pub fn build(&self, resource_name: &str) -> Result<ResourceDescriptor> {
        let table = self.catalog.lookup(resource_name)?;

        let abs_path = naming::absolute_path(self.package_dir, resource_name);
        let metadata = std::fs::metadata(&abs_path).map_err(|source| DatapkgError::ResourceFile {
            path: abs_path.clone(),
            source,
        })?;
        let hash = checksum::hash_file(&abs_path)?;

        let tables = self.settings.unpartitioned_tables([resource_name]);
        let data_sources = sources::data_sources_from_tables(self.fk_graph, &tables)?;

        let descriptor = ResourceDescriptor {
            profile: RESOURCE_PROFILE.to_string(),
            name: resource_name.to_string(),
            path: naming::relative_path(resource_name),
            title: table.title.clone(),
            description: table.description.clone(),
            format: "csv".to_string(),
            mediatype: "text/csv".to_string(),
            encoding: "utf-8".to_string(),
            compression: Compression::for_resource(resource_name)
                .descriptor_value()
                .map(String::from),
            bytes: metadata.len(),
            hash,
            created: created_now(),
            schema: table.schema.clone(),
            sources: sources::compile_sources(data_sources.iter().copied()),
            coverage: Coverage::for_resource(resource_name, self.settings)?,
            group: self.settings.partition_group(resource_name),
        };

        let errors = validate::validate_resource(&descriptor);
        if !errors.is_empty() {
            return Err(DatapkgError::InvalidResource {
                name: resource_name.to_string(),
                errors,
            });
        }

        debug!(resource = %resource_name, bytes = descriptor.bytes, "Built valid resource descriptor");
        Ok(descriptor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn settings() -> DatapkgSettings {
        serde_json::from_value(json!({
            "name": "pudl-test",
            "title": "PUDL test package",
            "description": "CEMS",
            "datasets": [
                {"epacems": {
                    "epacems_years": [2018],
                    "epacems_states": ["ID"],
                    "partition": {"hourly_emissions_epacems": ["epacems_years", "epacems_states"]}
                }}
            ]
        }))
        .unwrap()
    }

    fn write_resource(dir: &Path, name: &str, content: &[u8]) {
        let path = naming::absolute_path(dir, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::File::create(path).unwrap().write_all(content).unwrap();
    }

    #[test]
    fn test_build_partition_descriptor() {
        let dir = TempDir::new().unwrap();
        let catalog = SchemaCatalog::embedded().unwrap();
        let graph = ForeignKeyGraph::from_catalog(&catalog);
        let settings = settings();
        write_resource(dir.path(), "hourly_emissions_epacems_2018_id", b"not really gzip");

        let builder = ResourceBuilder::new(&catalog, &graph, &settings, dir.path());
        let descriptor = builder.build("hourly_emissions_epacems_2018_id").unwrap();

        assert_eq!(descriptor.path, "data/hourly_emissions_epacems_2018_id.csv.gz");
        assert_eq!(descriptor.compression.as_deref(), Some("gz"));
        assert_eq!(descriptor.bytes, 15);
        assert_eq!(descriptor.hash, checksum::hash_bytes(b"not really gzip"));
        assert_eq!(descriptor.group.as_deref(), Some("hourly_emissions_epacems"));
        assert_eq!(descriptor.table(), "hourly_emissions_epacems");
        assert_eq!(descriptor.coverage.spatial.state.as_deref(), Some("ID"));
        assert!(descriptor.created.ends_with('Z'));
        assert_eq!(descriptor.sources.len(), 2);
    }

    #[test]
    fn test_hash_reflects_current_content() {
        let dir = TempDir::new().unwrap();
        let catalog = SchemaCatalog::embedded().unwrap();
        let graph = ForeignKeyGraph::from_catalog(&catalog);
        let settings = settings();
        let builder = ResourceBuilder::new(&catalog, &graph, &settings, dir.path());

        write_resource(dir.path(), "plants_eia", b"plant_id_eia,plant_name_eia\n3,Barry\n");
        let first = builder.build("plants_eia").unwrap();
        write_resource(dir.path(), "plants_eia", b"plant_id_eia,plant_name_eia\n3,Barrz\n");
        let second = builder.build("plants_eia").unwrap();

        assert_eq!(first.bytes, second.bytes);
        assert_ne!(first.hash, second.hash);
        assert_eq!(first.compression, None);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let catalog = SchemaCatalog::embedded().unwrap();
        let graph = ForeignKeyGraph::from_catalog(&catalog);
        let settings = settings();
        let builder = ResourceBuilder::new(&catalog, &graph, &settings, dir.path());

        assert!(matches!(
            builder.build("plants_eia"),
            Err(DatapkgError::ResourceFile { .. })
        ));
        assert!(builder.build("boilers_eia860").unwrap_err().is_lookup());
    }
}
