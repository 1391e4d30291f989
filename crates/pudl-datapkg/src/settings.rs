//! Data package settings
//!
//! One entry of the ETL settings file's `datapkg_bundle_settings` list. The
//! per-dataset ETL parameters are kept as untyped JSON: they are embedded
//! verbatim in the package descriptor, and the only things read back here are
//! `partition` maps and `<source>_years` lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Settings for a single tabular data package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatapkgSettings {
    pub name: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Single-key maps of dataset name to its ETL parameters
    pub datasets: Vec<BTreeMap<String, Value>>,
}

impl DatapkgSettings {
    /// Dataset names in configuration order
    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().flat_map(|d| d.keys().map(String::as_str))
    }

    pub fn dataset_params(&self, dataset: &str) -> Option<&Value> {
        self.datasets.iter().find_map(|d| d.get(dataset))
    }

    pub fn dataset_params_mut(&mut self, dataset: &str) -> Option<&mut Value> {
        self.datasets.iter_mut().find_map(|d| d.get_mut(dataset))
    }

    /// Partitioned tables and the variables they are split on,
    /// e.g. `hourly_emissions_epacems -> [epacems_years, epacems_states]`
    pub fn partitions(&self) -> BTreeMap<String, Vec<String>> {
        let mut partitions = BTreeMap::new();
        for params in self.datasets.iter().flat_map(|d| d.values()) {
            if let Some(Value::Object(tables)) = params.get("partition") {
                for (table, variables) in tables {
                    let variables = variables
                        .as_array()
                        .map(|vars| vars.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                        .unwrap_or_default();
                    partitions.insert(table.clone(), variables);
                }
            }
        }
        partitions
    }

    /// Partitioned table a resource belongs to, if any
    pub fn partition_group(&self, resource_name: &str) -> Option<String> {
        self.partitions()
            .into_keys()
            .find(|table| resource_name.contains(table.as_str()))
    }

    /// Table names behind a list of resource names
    ///
    /// Partition resources collapse onto their table, everything else is
    /// already a table name.
    pub fn unpartitioned_tables<I, S>(&self, resources: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let partitions = self.partitions();
        resources
            .into_iter()
            .map(|resource| {
                let resource = resource.as_ref();
                partitions
                    .keys()
                    .find(|table| resource.contains(table.as_str()))
                    .cloned()
                    .unwrap_or_else(|| resource.to_string())
            })
            .collect()
    }

    /// Smallest and largest value of `<param>` across all datasets
    ///
    /// The first dataset that declares a non-empty integer list wins.
    pub fn year_range(&self, param: &str) -> Option<(i32, i32)> {
        self.datasets.iter().flat_map(|d| d.values()).find_map(|params| {
            let years: Vec<i32> = params
                .get(param)?
                .as_array()?
                .iter()
                .filter_map(|y| y.as_i64().and_then(|y| i32::try_from(y).ok()))
                .collect();
            Some((*years.iter().min()?, *years.iter().max()?))
        })
    }
}
