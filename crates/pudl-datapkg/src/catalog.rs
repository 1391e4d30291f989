//! Schema catalog
//!
//! The catalog is the static description of every table PUDL can publish:
//! fields, primary keys, foreign keys and autoincrement columns. It is parsed
//! once, usually from the copy embedded in this crate, and then handed by
//! reference to the foreign key resolver and the metadata assembler.
//!
//! Partitioned tables have a single catalog entry. A resource such as
//! `hourly_emissions_epacems_2018_id` resolves to the `hourly_emissions_epacems`
//! entry.

use crate::error::{DatapkgError, Result};
use pudl_common::partition::EPACEMS_TABLE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const EMBEDDED_CATALOG: &str = include_str!("meta/datapackage.json");

/// Tables that are split into many resources, keyed by the substring every
/// resource of the table contains
const PARTITIONED_TABLES: &[&str] = &[EPACEMS_TABLE];

/// Logical type of a table field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Datetime,
    Year,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

impl Field {
    pub fn is_required(&self) -> bool {
        self.constraints.as_ref().is_some_and(|c| c.required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub resource: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub fields: Vec<String>,
    pub reference: Reference,
}

/// Table schema in tabular data package notation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    #[serde(rename = "primaryKey", default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(rename = "foreignKeys", default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub schema: Schema,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    resources: Vec<TableSchema>,
    #[serde(default)]
    autoincrement: BTreeMap<String, String>,
}

/// Parsed, read-only schema catalog
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<TableSchema>,
    autoincrement: BTreeMap<String, String>,
}

impl SchemaCatalog {
    /// Catalog shipped with this crate
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_CATALOG)
    }

    /// Load a catalog from a `datapackage.json`-shaped file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: CatalogDocument =
            serde_json::from_str(json).map_err(|e| DatapkgError::CatalogParse(e.to_string()))?;
        debug!(tables = document.resources.len(), "Parsed schema catalog");
        Ok(Self {
            tables: document.resources,
            autoincrement: document.autoincrement,
        })
    }

    /// Catalog entry for a resource, stripping any partition suffix
    ///
    /// Fails if the underlying table appears zero or several times.
    pub fn lookup(&self, resource_name: &str) -> Result<&TableSchema> {
        let table_name = table_for_resource(resource_name);
        let mut matches = self.tables.iter().filter(|t| t.name == table_name);

        match (matches.next(), matches.count()) {
            (Some(table), 0) => Ok(table),
            (Some(_), extra) => Err(DatapkgError::AmbiguousTable {
                name: resource_name.to_string(),
                count: extra + 1,
            }),
            (None, _) => Err(DatapkgError::TableNotFound(resource_name.to_string())),
        }
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.iter().any(|t| t.name == table_name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter()
    }

    /// Autoincrement columns for whichever of `tables` declare one
    pub fn autoincrement<I, S>(&self, tables: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tables
            .into_iter()
            .filter_map(|table| {
                let table = table.as_ref();
                self.autoincrement
                    .get(table)
                    .map(|column| (table.to_string(), column.clone()))
            })
            .collect()
    }
}

/// Underlying table of a (possibly partitioned) resource
pub fn table_for_resource(resource_name: &str) -> &str {
    PARTITIONED_TABLES
        .iter()
        .find(|table| resource_name.contains(*table))
        .copied()
        .unwrap_or(resource_name)
}
