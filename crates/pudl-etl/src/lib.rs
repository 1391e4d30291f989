//! PUDL ETL Library
//!
//! Extracts EIA 860 plants and EPA CEMS hourly emissions from a local
//! datastore, writes them as package resources and publishes each package's
//! descriptor once every task behind it succeeded.
//!
//! # Modules
//!
//! - [`config`]: runtime configuration and the YAML settings file
//! - [`datastore`]: raw input files
//! - [`store`]: resource files inside a package directory
//! - [`columnar`]: the parquet copy of the EPA CEMS partitions
//! - [`eia`] and [`epacems`]: extract and transform functions
//! - [`pipeline`]: dataset pipelines and the flow builder
//! - [`graph`] and [`scheduler`]: the task graph and its executor
//! - [`etl`]: bundle orchestration
//!
//! # Example
//!
//! ```no_run
//! use pudl_datapkg::{ForeignKeyGraph, SchemaCatalog};
//! use pudl_etl::config::{EtlConfig, EtlSettings};
//! use pudl_etl::datastore::LocalDatastore;
//! use pudl_etl::etl::Etl;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let settings = EtlSettings::load("settings/etl_example.yml")?;
//!     let catalog = SchemaCatalog::embedded()?;
//!     let fk_graph = ForeignKeyGraph::from_catalog(&catalog);
//!     let datastore = Arc::new(LocalDatastore::new(&config.pudl_in));
//!
//!     Etl::new(&config, &catalog, &fk_graph, datastore).run(&settings).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod columnar;
pub mod config;
pub mod datastore;
pub mod eia;
pub mod epacems;
pub mod error;
pub mod etl;
pub mod graph;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod task;

pub use error::{EtlError, Result, TaskError};
