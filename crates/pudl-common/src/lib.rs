//! PUDL Common Library
//!
//! Shared types, utilities, and error handling for the PUDL workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`PudlError`] and the crate [`Result`] alias
//! - **Logging**: `tracing` subscriber bootstrap shared by every binary
//! - **Checksums**: streaming SHA-256 file hashes in data package notation
//! - **Partitions**: the EPA CEMS (year, state) unit of work and its naming
//! - **Resources**: how a resource name maps to a file inside a package
//!
//! # Example
//!
//! ```no_run
//! use pudl_common::checksum::hash_file;
//! use pudl_common::partition::enumerate;
//!
//! fn main() -> pudl_common::Result<()> {
//!     for partition in enumerate(&[2018], &["ID", "ME"]) {
//!         println!("{}", partition.resource_name());
//!     }
//!     println!("{}", hash_file("data/plants_entity_eia.csv")?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod partition;
pub mod resource;

// Re-export commonly used types
pub use error::{PudlError, Result};
pub use partition::EpaCemsPartition;
