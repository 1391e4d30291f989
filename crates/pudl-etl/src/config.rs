//! Configuration management
//!
//! Two layers: [`EtlConfig`] is the runtime environment (where raw data
//! lives, where packages go, how many tasks may run at once) and
//! [`EtlSettings`] is the YAML file describing which packages to build.

use crate::error::{EtlError, Result};
use crate::pipeline::Dataset;
use pudl_common::partition::{EPACEMS_STATES, EPACEMS_TABLE};
use pudl_datapkg::DatapkgSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Runtime Configuration Constants
// ============================================================================

/// Default root of the raw input datastore.
pub const DEFAULT_PUDL_IN: &str = "./pudl-in";

/// Default root of the ETL outputs.
pub const DEFAULT_PUDL_OUT: &str = "./pudl-out";

/// Default number of tasks allowed in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Subdirectory of `pudl_out` holding data package bundles.
pub const DATAPKG_DIR: &str = "datapkg";

/// Subdirectory of `pudl_out` holding parquet datasets.
pub const PARQUET_DIR: &str = "parquet";

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub pudl_in: PathBuf,
    pub pudl_out: PathBuf,
    pub concurrency: usize,
    /// Replace an existing bundle directory instead of refusing to run
    pub clobber: bool,
}

impl EtlConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup
    ///
    /// A variable that is set but does not parse is an error rather than a
    /// silent fallback to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let config = EtlConfig {
            pudl_in: lookup("PUDL_IN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUDL_IN)),
            pudl_out: lookup("PUDL_OUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUDL_OUT)),
            concurrency: parse_var(&lookup, "PUDL_CONCURRENCY")?.unwrap_or(DEFAULT_CONCURRENCY),
            clobber: parse_var(&lookup, "PUDL_CLOBBER")?.unwrap_or(false),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pudl_in.as_os_str().is_empty() {
            anyhow::bail!("PUDL_IN cannot be empty");
        }

        if self.pudl_out.as_os_str().is_empty() {
            anyhow::bail!("PUDL_OUT cannot be empty");
        }

        if self.concurrency == 0 {
            anyhow::bail!("Concurrency must be greater than 0");
        }

        if self.pudl_in == self.pudl_out {
            tracing::warn!(path = %self.pudl_in.display(), "PUDL_IN and PUDL_OUT point at the same directory");
        }

        Ok(())
    }

    /// Directory every package of a bundle is written under
    pub fn bundle_dir(&self, bundle_name: &str) -> PathBuf {
        self.pudl_out.join(DATAPKG_DIR).join(bundle_name)
    }

    pub fn package_dir(&self, bundle_name: &str, package_name: &str) -> PathBuf {
        self.bundle_dir(bundle_name).join(package_name)
    }

    pub fn parquet_dir(&self) -> PathBuf {
        self.pudl_out.join(PARQUET_DIR)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {} value '{}': {}", key, raw, e))
        })
        .transpose()
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            pudl_in: PathBuf::from(DEFAULT_PUDL_IN),
            pudl_out: PathBuf::from(DEFAULT_PUDL_OUT),
            concurrency: DEFAULT_CONCURRENCY,
            clobber: false,
        }
    }
}

/// Contents of an ETL settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlSettings {
    pub datapkg_bundle_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapkg_bundle_doi: Option<String>,
    pub datapkg_bundle_settings: Vec<DatapkgSettings>,
}

impl EtlSettings {
    /// Read, parse and normalise a settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut settings: EtlSettings = serde_yaml::from_str(yaml)?;
        settings.normalize()?;
        Ok(settings)
    }

    /// Check names and datasets, expand `ALL` states and make the CEMS
    /// partitioning explicit so it ends up in the package descriptor
    pub fn normalize(&mut self) -> Result<()> {
        if self.datapkg_bundle_name.trim().is_empty() {
            return Err(EtlError::Config("datapkg_bundle_name cannot be empty".to_string()));
        }
        if self.datapkg_bundle_settings.is_empty() {
            return Err(EtlError::Config(
                "datapkg_bundle_settings must list at least one package".to_string(),
            ));
        }

        let mut package_names = std::collections::HashSet::new();
        for package in &mut self.datapkg_bundle_settings {
            if !package_names.insert(package.name.clone()) {
                return Err(EtlError::Config(format!("Duplicate package name '{}'", package.name)));
            }

            for (name, params) in package.datasets.iter_mut().flat_map(|d| d.iter_mut()) {
                match Dataset::from_str(name)? {
                    Dataset::Eia => {
                        EiaParams::from_value(params)?;
                    }
                    Dataset::EpaCems => normalize_epacems(params)?,
                }
            }
        }

        Ok(())
    }
}

fn normalize_epacems(params: &mut Value) -> Result<()> {
    let object = params
        .as_object_mut()
        .ok_or_else(|| EtlError::Config("epacems parameters must be a mapping".to_string()))?;

    let expand_all = object
        .get("epacems_states")
        .and_then(Value::as_array)
        .is_some_and(|states| states.iter().any(|s| s.as_str().is_some_and(|s| s.eq_ignore_ascii_case("ALL"))));
    if expand_all {
        object.insert(
            "epacems_states".to_string(),
            Value::from(EPACEMS_STATES.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
        );
    }

    if !object.contains_key("partition") {
        let mut partition = serde_json::Map::new();
        partition.insert(
            EPACEMS_TABLE.to_string(),
            Value::from(vec!["epacems_years", "epacems_states"]),
        );
        object.insert("partition".to_string(), Value::Object(partition));
    }

    EpaCemsParams::from_value(params)?;
    Ok(())
}

/// ETL parameters of the `eia` dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EiaParams {
    #[serde(default)]
    pub eia860_years: Vec<i32>,
}

impl EiaParams {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| EtlError::Config(format!("Invalid eia parameters: {}", e)))
    }
}

/// ETL parameters of the `epacems` dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpaCemsParams {
    #[serde(default)]
    pub epacems_years: Vec<i32>,
    #[serde(default)]
    pub epacems_states: Vec<String>,
    #[serde(default)]
    pub partition: BTreeMap<String, Vec<String>>,
}

impl EpaCemsParams {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| EtlError::Config(format!("Invalid epacems parameters: {}", e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"
datapkg_bundle_name: pudl-example
datapkg_bundle_doi: 10.5281/zenodo.3653159
datapkg_bundle_settings:
  - name: pudl-eia
    title: EIA plants
    description: Plant entities
    datasets:
      - eia:
          eia860_years: [2017, 2018]
  - name: pudl-epacems
    title: EPA CEMS
    description: Hourly emissions
    datasets:
      - epacems:
          epacems_years: [2018]
          epacems_states: [ALL]
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EtlConfig {
            concurrency: 0,
            ..EtlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: std::collections::HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_from_variables() {
        let config = EtlConfig::from_lookup(lookup(&[
            ("PUDL_OUT", "/data/out"),
            ("PUDL_CONCURRENCY", " 8 "),
            ("PUDL_CLOBBER", "true"),
        ]))
        .unwrap();
        assert_eq!(config.pudl_in, PathBuf::from(DEFAULT_PUDL_IN));
        assert_eq!(config.pudl_out, PathBuf::from("/data/out"));
        assert_eq!(config.concurrency, 8);
        assert!(config.clobber);
    }

    #[test]
    fn test_malformed_variables_rejected() {
        let err = EtlConfig::from_lookup(lookup(&[("PUDL_CONCURRENCY", "many")])).unwrap_err();
        assert!(err.to_string().contains("PUDL_CONCURRENCY"));

        let err = EtlConfig::from_lookup(lookup(&[("PUDL_CLOBBER", "yes")])).unwrap_err();
        assert!(err.to_string().contains("PUDL_CLOBBER"));

        assert!(EtlConfig::from_lookup(lookup(&[("PUDL_CONCURRENCY", "0")])).is_err());
    }

    #[test]
    fn test_package_dir_layout() {
        let config = EtlConfig {
            pudl_out: PathBuf::from("/out"),
            ..EtlConfig::default()
        };
        assert_eq!(
            config.package_dir("bundle", "pudl-eia"),
            PathBuf::from("/out/datapkg/bundle/pudl-eia")
        );
        assert_eq!(config.parquet_dir(), PathBuf::from("/out/parquet"));
    }

    #[test]
    fn test_settings_expand_all_states_and_partition() {
        let settings = EtlSettings::from_yaml_str(SETTINGS).unwrap();
        assert_eq!(settings.datapkg_bundle_settings.len(), 2);

        let cems = &settings.datapkg_bundle_settings[1];
        let params = EpaCemsParams::from_value(cems.dataset_params("epacems").unwrap()).unwrap();
        assert_eq!(params.epacems_states.len(), EPACEMS_STATES.len());
        assert_eq!(
            params.partition.get(EPACEMS_TABLE).unwrap(),
            &vec!["epacems_years".to_string(), "epacems_states".to_string()]
        );
        assert_eq!(cems.partition_group("hourly_emissions_epacems_2018_id").as_deref(), Some(EPACEMS_TABLE));
    }

    #[test]
    fn test_settings_reject_unknown_dataset() {
        let yaml = SETTINGS.replace("- eia:", "- ferc1:");
        let err = EtlSettings::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, EtlError::UnknownDataset(name) if name == "ferc1"));
    }

    #[test]
    fn test_settings_reject_duplicate_packages() {
        let yaml = SETTINGS.replace("name: pudl-epacems", "name: pudl-eia");
        assert!(matches!(EtlSettings::from_yaml_str(&yaml), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_settings_reject_malformed_params() {
        let yaml = SETTINGS.replace("eia860_years: [2017, 2018]", "eia860_years: recent");
        assert!(matches!(EtlSettings::from_yaml_str(&yaml), Err(EtlError::Config(_))));
    }
}
