//! EPA CEMS partition model
//!
//! The hourly emissions table is far too large to process in one piece, so it
//! is split into one unit of work per (year, state). Each partition is written
//! to its own resource, and the resource name is the only place the metadata
//! layer can recover the partition from, so [`EpaCemsPartition::resource_name`]
//! and [`EpaCemsPartition::from_resource_name`] must stay exact inverses.

use crate::error::{PudlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;

/// Base table name shared by every CEMS partition resource
pub const EPACEMS_TABLE: &str = "hourly_emissions_epacems";

/// Years of CEMS data available from EPA
pub const EPACEMS_YEARS: RangeInclusive<i32> = 1995..=2019;

/// States (plus DC) that report hourly emissions to EPA
pub const EPACEMS_STATES: &[&str] = &[
    "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "IA", "ID", "IL", "IN", "KS",
    "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE", "NH", "NJ",
    "NM", "NV", "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VA", "VT",
    "WA", "WI", "WV", "WY",
];

/// One (year, state) unit of EPA CEMS work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpaCemsPartition {
    pub year: i32,
    /// Two letter postal code, always uppercase
    pub state: String,
}

impl EpaCemsPartition {
    /// Build a partition, rejecting anything outside the CEMS domain
    pub fn new(year: i32, state: impl AsRef<str>) -> Result<Self> {
        let state = state.as_ref().trim().to_uppercase();
        if !is_valid(year, &state) {
            return Err(PudlError::InvalidPartition(format!(
                "{}-{} is not in the EPA CEMS domain ({}..={}, {} states)",
                year,
                state,
                EPACEMS_YEARS.start(),
                EPACEMS_YEARS.end(),
                EPACEMS_STATES.len()
            )));
        }
        Ok(Self { year, state })
    }

    /// Name of the resource this partition is written to,
    /// e.g. `hourly_emissions_epacems_2018_id`
    pub fn resource_name(&self) -> String {
        format!("{}_{}_{}", EPACEMS_TABLE, self.year, self.state.to_lowercase())
    }

    /// Recover a partition from a resource name produced by [`Self::resource_name`]
    pub fn from_resource_name(name: &str) -> Result<Self> {
        let invalid = || PudlError::InvalidResourceName(format!(
            "'{}' is not of the form {}_<year>_<state>",
            name, EPACEMS_TABLE
        ));

        let suffix = name
            .strip_prefix(EPACEMS_TABLE)
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(invalid)?;
        let (year, state) = suffix.split_once('_').ok_or_else(invalid)?;
        if year.len() != 4 || state.len() != 2 || state.chars().any(|c| !c.is_ascii_lowercase()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;

        Self::new(year, state)
    }

    /// Monthly raw file names EPA publishes for this partition
    pub fn raw_file_names(&self) -> Vec<String> {
        (1..=12)
            .map(|month| format!("epacems{}{}{:02}.csv", self.year, self.state.to_lowercase(), month))
            .collect()
    }
}

impl fmt::Display for EpaCemsPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.state)
    }
}

/// Whether (year, state) is a partition EPA actually publishes
pub fn is_valid(year: i32, state: &str) -> bool {
    EPACEMS_YEARS.contains(&year) && EPACEMS_STATES.contains(&state)
}

/// Cross product of the configured years and states
///
/// Years form the outer loop. States are normalised to uppercase, duplicates
/// are dropped, and combinations outside the CEMS domain are skipped rather
/// than treated as errors.
pub fn enumerate<S: AsRef<str>>(years: &[i32], states: &[S]) -> Vec<EpaCemsPartition> {
    let mut seen = HashSet::new();
    let mut partitions = Vec::with_capacity(years.len() * states.len());

    for &year in years {
        for state in states {
            let state = state.as_ref().trim().to_uppercase();
            if !is_valid(year, &state) {
                tracing::debug!(year, state = %state, "Skipping partition outside the EPA CEMS domain");
                continue;
            }
            let partition = EpaCemsPartition { year, state };
            if seen.insert(partition.clone()) {
                partitions.push(partition);
            }
        }
    }

    partitions
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::subsequence;

    #[test]
    fn test_resource_name() {
        let partition = EpaCemsPartition::new(2018, "id").unwrap();
        assert_eq!(partition.state, "ID");
        assert_eq!(partition.resource_name(), "hourly_emissions_epacems_2018_id");
        assert_eq!(partition.to_string(), "2018-ID");
    }

    #[test]
    fn test_from_resource_name() {
        let partition = EpaCemsPartition::from_resource_name("hourly_emissions_epacems_1999_wy").unwrap();
        assert_eq!(partition.year, 1999);
        assert_eq!(partition.state, "WY");
    }

    #[test]
    fn test_from_resource_name_rejects_malformed() {
        for name in [
            "hourly_emissions_epacems",
            "hourly_emissions_epacems_2018",
            "hourly_emissions_epacems_2018_ID",
            "hourly_emissions_epacems_18_id",
            "hourly_emissions_epacems_2018_idaho",
            "hourly_emissions_epacems_1775_id",
            "plants_entity_eia",
        ] {
            assert!(EpaCemsPartition::from_resource_name(name).is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn test_new_rejects_outside_domain() {
        assert!(EpaCemsPartition::new(1775, "ID").is_err());
        assert!(EpaCemsPartition::new(2018, "confederacy").is_err());
        assert!(EpaCemsPartition::new(2018, "AK").is_err());
    }

    #[test]
    fn test_enumerate_drops_invalid_and_duplicates() {
        let partitions = enumerate(&[2017, 1775, 2018], &["id", "XX", "ID", "me"]);
        let names: Vec<_> = partitions.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["2017-ID", "2017-ME", "2018-ID", "2018-ME"]);
    }

    #[test]
    fn test_raw_file_names() {
        let partition = EpaCemsPartition::new(2018, "ID").unwrap();
        let names = partition.raw_file_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "epacems2018id01.csv");
        assert_eq!(names[11], "epacems2018id12.csv");
    }

    fn valid_years() -> impl Strategy<Value = Vec<i32>> {
        subsequence(EPACEMS_YEARS.collect::<Vec<_>>(), 0..=EPACEMS_YEARS.count())
    }

    fn valid_states() -> impl Strategy<Value = Vec<&'static str>> {
        subsequence(EPACEMS_STATES.to_vec(), 0..=EPACEMS_STATES.len())
    }

    proptest! {
        #[test]
        fn prop_enumerate_is_full_cross_product(years in valid_years(), states in valid_states()) {
            let partitions = enumerate(&years, &states);
            prop_assert_eq!(partitions.len(), years.len() * states.len());

            let unique: HashSet<_> = partitions.iter().map(|p| (p.year, p.state.clone())).collect();
            prop_assert_eq!(unique.len(), partitions.len());

            let names: HashSet<_> = partitions.iter().map(|p| p.resource_name()).collect();
            prop_assert_eq!(names.len(), partitions.len());
        }

        #[test]
        fn prop_resource_name_round_trips(years in valid_years(), states in valid_states()) {
            for partition in enumerate(&years, &states) {
                let parsed = EpaCemsPartition::from_resource_name(&partition.resource_name()).unwrap();
                prop_assert_eq!(parsed, partition);
            }
        }
    }
}
