//! PUDL data package metadata
//!
//! Reconciles the static schema catalog with the resource files an ETL run
//! actually produced, and publishes the result as a validated tabular data
//! package descriptor.
//!
//! # Overview
//!
//! - [`catalog`]: the schema catalog, parsed once and passed by reference
//! - [`foreign_keys`]: foreign key graph and its transitive closure
//! - [`sources`]: data source, keyword, contributor and license tables
//! - [`coverage`]: temporal and spatial coverage inferred from resource names
//! - [`resource`] and [`package`]: descriptor assembly
//! - [`validate`]: descriptor and data conformance checks
//!
//! # Example
//!
//! ```no_run
//! use pudl_datapkg::{BundleIdentity, DatapkgSettings, ForeignKeyGraph, PackageAssembler, SchemaCatalog};
//! use std::path::Path;
//!
//! fn main() -> pudl_datapkg::Result<()> {
//!     let catalog = SchemaCatalog::embedded()?;
//!     let graph = ForeignKeyGraph::from_catalog(&catalog);
//!     println!("{:?}", graph.closure(["generation_eia923"])?);
//!
//!     let settings: DatapkgSettings = serde_json::from_str(
//!         r#"{"name": "pudl-eia", "title": "EIA", "description": "Plants",
//!             "datasets": [{"eia": {"eia860_years": [2018]}}]}"#,
//!     )?;
//!     let resources = vec!["plants_eia".to_string(), "plants_entity_eia".to_string()];
//!     PackageAssembler::new(&catalog, &graph).assemble(
//!         &settings,
//!         &resources,
//!         Path::new("datapkg/bundle/pudl-eia"),
//!         BundleIdentity::default(),
//!     )?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod coverage;
pub mod error;
pub mod foreign_keys;
pub mod identity;
pub mod package;
pub mod resource;
pub mod settings;
pub mod sources;
pub mod validate;

pub use catalog::SchemaCatalog;
pub use error::{DatapkgError, Result};
pub use foreign_keys::ForeignKeyGraph;
pub use package::{BundleIdentity, PackageAssembler, PackageDescriptor};
pub use resource::{ResourceBuilder, ResourceDescriptor};
pub use settings::DatapkgSettings;
