//! Tabular data package assembly
//!
//! [`PackageAssembler::assemble`] turns the resource files of one package
//! directory into a validated `datapackage.json`. The order of work matters:
//!
//! 1. bundle UUID and DOI are checked before anything else,
//! 2. every resource descriptor is built and validated,
//! 3. the package descriptor is validated,
//! 4. every resource file is validated against its schema,
//! 5. only then is `datapackage.json` written, via a temporary file.
//!
//! Any failure leaves the package directory without a descriptor.

use crate::catalog::SchemaCatalog;
use crate::error::{DatapkgError, Result};
use crate::foreign_keys::ForeignKeyGraph;
use crate::identity;
use crate::resource::{created_now, ResourceBuilder, ResourceDescriptor};
use crate::settings::DatapkgSettings;
use crate::sources::{self, Contributor, License, Source};
use crate::validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use uuid::Uuid;

pub const PACKAGE_PROFILE: &str = "tabular-data-package";
pub const HOMEPAGE: &str = "https://catalyst.coop/pudl/";
pub const DESCRIPTOR_FILE: &str = "datapackage.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub id: Uuid,
    pub profile: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub homepage: String,
    pub created: String,
    pub contributors: Vec<Contributor>,
    pub sources: Vec<Source>,
    #[serde(rename = "etl-parameters-pudl")]
    pub etl_parameters: Vec<BTreeMap<String, Value>>,
    pub licenses: Vec<License>,
    pub autoincrement: BTreeMap<String, String>,
    #[serde(rename = "software-package-name")]
    pub software_name: String,
    #[serde(rename = "software-package-version")]
    pub software_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "datapkg-bundle-uuid", default, skip_serializing_if = "Option::is_none")]
    pub bundle_uuid: Option<Uuid>,
    #[serde(rename = "datapkg-bundle-doi", default, skip_serializing_if = "Option::is_none")]
    pub bundle_doi: Option<String>,
    pub resources: Vec<ResourceDescriptor>,
}

impl PackageDescriptor {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Bundle identity shared by every package of one ETL run
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleIdentity<'a> {
    pub uuid: Option<&'a str>,
    pub doi: Option<&'a str>,
}

pub struct PackageAssembler<'a> {
    catalog: &'a SchemaCatalog,
    fk_graph: &'a ForeignKeyGraph,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(catalog: &'a SchemaCatalog, fk_graph: &'a ForeignKeyGraph) -> Self {
        Self { catalog, fk_graph }
    }

    /// Build, validate and write the descriptor of one package
    pub fn assemble(
        &self,
        settings: &DatapkgSettings,
        resources: &[String],
        package_dir: &Path,
        bundle: BundleIdentity<'_>,
    ) -> Result<PackageDescriptor> {
        info!(package = %settings.name, resources = resources.len(), "Assembling data package metadata");

        let bundle_uuid = bundle
            .uuid
            .map(|value| identity::validate_bundle_uuid(&settings.name, value))
            .transpose()?;
        if let Some(doi) = bundle.doi {
            identity::validate_doi(&settings.name, doi)?;
        }

        let builder = ResourceBuilder::new(self.catalog, self.fk_graph, settings, package_dir);
        let resource_descriptors = resources
            .iter()
            .map(|name| builder.build(name))
            .collect::<Result<Vec<_>>>()?;

        let tables = settings.unpartitioned_tables(resources);
        let data_sources = sources::data_sources_from_tables(self.fk_graph, &tables)?;

        let descriptor = PackageDescriptor {
            name: settings.name.clone(),
            id: Uuid::new_v4(),
            profile: PACKAGE_PROFILE.to_string(),
            title: settings.title.clone(),
            description: settings.description.clone(),
            keywords: sources::compile_keywords(data_sources.iter().copied()),
            homepage: HOMEPAGE.to_string(),
            created: created_now(),
            contributors: sources::compile_contributors(data_sources.iter().copied()),
            sources: sources::compile_sources(data_sources.iter().copied()),
            etl_parameters: settings.datasets.clone(),
            licenses: vec![sources::cc_by_4_0()],
            autoincrement: self.catalog.autoincrement(&tables),
            software_name: env!("CARGO_PKG_NAME").to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            version: settings.version.clone(),
            bundle_uuid,
            bundle_doi: bundle.doi.map(String::from),
            resources: resource_descriptors,
        };

        validate_package(&descriptor, package_dir)?;
        let path = write_descriptor(&descriptor, package_dir)?;

        info!(package = %descriptor.name, path = %path.display(), "Congrats! You made a valid data package");
        Ok(descriptor)
    }
}

/// Descriptor conformance, then data conformance of every resource file
pub fn validate_package(descriptor: &PackageDescriptor, package_dir: &Path) -> Result<()> {
    info!(package = %descriptor.name, "Validating JSON descriptor");
    let errors = validate::validate_package(descriptor);
    if !errors.is_empty() {
        return Err(DatapkgError::InvalidPackage {
            name: descriptor.name.clone(),
            errors,
        });
    }

    info!(package = %descriptor.name, "Validating resource data against schemas");
    let report = validate::validate_data(package_dir, &descriptor.resources);
    if !report.is_valid() {
        let pretty = serde_json::to_string_pretty(&report.compact())?;
        error!(package = %descriptor.name, "Data validation failed: {}", pretty);
        return Err(DatapkgError::DataValidation {
            package: descriptor.name.clone(),
            summary: report.summary(),
        });
    }

    Ok(())
}

/// Write `datapackage.json` into the package directory, replacing any
/// previous descriptor in one step
pub fn write_descriptor(descriptor: &PackageDescriptor, package_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(package_dir)?;
    let path = package_dir.join(DESCRIPTOR_FILE);
    let tmp_path = package_dir.join(format!(".{}.tmp", DESCRIPTOR_FILE));

    let json = serde_json::to_string_pretty(descriptor)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, &path)?;

    Ok(path)
}
