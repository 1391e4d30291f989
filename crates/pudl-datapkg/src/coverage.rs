//! Temporal and spatial coverage of a resource
//!
//! Once the ETL has finished, the resource name is the only record of which
//! partition a file holds, so coverage is inferred from the name.

use crate::error::Result;
use crate::settings::DatapkgSettings;
use chrono::NaiveDate;
use pudl_common::partition::EPACEMS_TABLE;
use pudl_common::PudlError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Year and state segments ending a CEMS partition resource name
#[allow(clippy::expect_used)]
static PARTITION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d{4})_([A-Za-z]{2})$").expect("valid partition suffix pattern"));

/// Year and uppercase state of a CEMS partition resource
///
/// Only the name's shape is checked, not whether EPA publishes the partition.
fn cems_year_state(resource_name: &str) -> Result<(i32, String)> {
    let invalid = || {
        PudlError::InvalidResourceName(format!(
            "'{}' does not end in _<year>_<state>",
            resource_name
        ))
    };
    let captures = PARTITION_SUFFIX.captures(resource_name).ok_or_else(invalid)?;
    let year = captures[1].parse().map_err(|_| invalid())?;
    Ok((year, captures[2].to_uppercase()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalCoverage {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TemporalCoverage {
    pub fn unknown() -> Self {
        Self {
            start_date: None,
            end_date: None,
        }
    }

    /// January 1st of `start` through December 31st of `end`
    pub fn years(start: i32, end: i32) -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(start, 1, 1),
            end_date: NaiveDate::from_ymd_opt(end, 12, 31),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialCoverage {
    pub country: String,
    #[serde(rename = "iso_3166-1_alpha-2")]
    pub iso_3166_1_alpha_2: String,
    #[serde(rename = "iso_3166-1_alpha-3")]
    pub iso_3166_1_alpha_3: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "iso_3166-2", default, skip_serializing_if = "Option::is_none")]
    pub iso_3166_2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub temporal: TemporalCoverage,
    pub spatial: SpatialCoverage,
}

impl Coverage {
    pub fn for_resource(resource_name: &str, settings: &DatapkgSettings) -> Result<Self> {
        Ok(Self {
            temporal: temporal_coverage(resource_name, settings)?,
            spatial: spatial_coverage(resource_name)?,
        })
    }
}

/// Country level coverage, plus the state for CEMS partitions
pub fn spatial_coverage(resource_name: &str) -> Result<SpatialCoverage> {
    let mut coverage = SpatialCoverage {
        country: "United States of America".to_string(),
        iso_3166_1_alpha_2: "US".to_string(),
        iso_3166_1_alpha_3: "USA".to_string(),
        state: None,
        iso_3166_2: None,
    };

    if resource_name.contains(EPACEMS_TABLE) {
        let (_, state) = cems_year_state(resource_name)?;
        coverage.iso_3166_2 = Some(format!("US-{}", state));
        coverage.state = Some(state);
    }

    Ok(coverage)
}

/// Date range of the data in a resource
///
/// CEMS partitions cover their year. Other resources use the
/// `<source>_years` ETL parameter, where `<source>` is the last `_` segment of
/// the name, and are null when no dataset declares it.
pub fn temporal_coverage(resource_name: &str, settings: &DatapkgSettings) -> Result<TemporalCoverage> {
    if resource_name.contains(EPACEMS_TABLE) {
        let (year, _) = cems_year_state(resource_name)?;
        return Ok(TemporalCoverage::years(year, year));
    }

    let source = resource_name.rsplit('_').next().unwrap_or(resource_name);
    let coverage = settings
        .year_range(&format!("{}_years", source))
        .map(|(start, end)| TemporalCoverage::years(start, end))
        .unwrap_or_else(TemporalCoverage::unknown);

    Ok(coverage)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pudl_common::partition::{EpaCemsPartition, EPACEMS_STATES, EPACEMS_YEARS};
    use serde_json::json;

    fn settings() -> DatapkgSettings {
        serde_json::from_value(json!({
            "name": "pudl-test",
            "title": "PUDL test package",
            "description": "EIA only",
            "datasets": [
                {"eia": {"eia860_years": [2011, 2018], "eia923_years": [2009, 2010]}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_source_years() {
        let coverage = temporal_coverage("plants_eia860", &settings()).unwrap();
        assert_eq!(coverage, TemporalCoverage::years(2011, 2018));
    }

    #[test]
    fn test_no_source_years_is_null() {
        let coverage = temporal_coverage("plants_entity_eia", &settings()).unwrap();
        assert_eq!(coverage, TemporalCoverage::unknown());

        let json = serde_json::to_value(&coverage).unwrap();
        assert_eq!(json, json!({"start_date": null, "end_date": null}));
    }

    #[test]
    fn test_country_only_for_unpartitioned() {
        let coverage = spatial_coverage("plants_entity_eia").unwrap();
        assert_eq!(coverage.iso_3166_1_alpha_3, "USA");
        assert!(coverage.state.is_none());

        let json = serde_json::to_value(&coverage).unwrap();
        assert!(json.get("state").is_none());
        assert_eq!(json["iso_3166-1_alpha-2"], "US");
    }

    #[test]
    fn test_malformed_partition_name() {
        assert!(spatial_coverage("hourly_emissions_epacems_2018").is_err());
        assert!(temporal_coverage("hourly_emissions_epacems_18_id", &settings()).is_err());
    }

    #[test]
    fn test_uppercase_state_in_name() {
        let coverage = Coverage::for_resource("hourly_emissions_epacems_2018_ID", &settings()).unwrap();
        assert_eq!(coverage.spatial.state.as_deref(), Some("ID"));
        assert_eq!(coverage.spatial.iso_3166_2.as_deref(), Some("US-ID"));
        assert_eq!(coverage.temporal, TemporalCoverage::years(2018, 2018));
    }

    #[test]
    fn test_partition_outside_published_range() {
        let coverage = Coverage::for_resource("hourly_emissions_epacems_2021_dc", &settings()).unwrap();
        assert_eq!(coverage.temporal, TemporalCoverage::years(2021, 2021));
        assert_eq!(coverage.spatial.state.as_deref(), Some("DC"));

        let coverage = Coverage::for_resource("hourly_emissions_epacems_1990_zz", &settings()).unwrap();
        assert_eq!(coverage.temporal, TemporalCoverage::years(1990, 1990));
        assert_eq!(coverage.spatial.iso_3166_2.as_deref(), Some("US-ZZ"));
    }

    proptest! {
        #[test]
        fn prop_cems_coverage_from_name(
            year in EPACEMS_YEARS,
            state in proptest::sample::select(EPACEMS_STATES),
        ) {
            let name = EpaCemsPartition::new(year, state).unwrap().resource_name();
            let coverage = Coverage::for_resource(&name, &settings()).unwrap();

            let json = serde_json::to_value(&coverage).unwrap();
            prop_assert_eq!(&json["temporal"]["start_date"], &json!(format!("{}-01-01", year)));
            prop_assert_eq!(&json["temporal"]["end_date"], &json!(format!("{}-12-31", year)));
            prop_assert_eq!(coverage.spatial.state.as_deref(), Some(state));
            prop_assert_eq!(coverage.spatial.iso_3166_2, Some(format!("US-{}", state)));
        }
    }
}
