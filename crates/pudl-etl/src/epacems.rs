//! EPA CEMS extract and transform
//!
//! Raw EPA files report each hour in the plant's local standard time, one
//! file per state and month. Transforming a partition renames the raw
//! columns, converts the hour to UTC using the plant's standard offset and
//! tags every row with the partition's year and state.

use crate::eia::PlantEntityEia;
use crate::error::{ExtractError, TransformError};
use crate::store::TableRecord;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use pudl_common::EpaCemsPartition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Datastore dataset holding the raw monthly files
pub const DATASET: &str = "epacems";

/// Standard (non daylight saving) UTC offset in hours of the time zones
/// plants report in
const STANDARD_UTC_OFFSETS: &[(&str, i32)] = &[
    ("America/New_York", -5),
    ("America/Detroit", -5),
    ("America/Indiana/Indianapolis", -5),
    ("America/Indiana/Vincennes", -5),
    ("America/Kentucky/Louisville", -5),
    ("America/Kentucky/Monticello", -5),
    ("US/Eastern", -5),
    ("America/Chicago", -6),
    ("America/Indiana/Knox", -6),
    ("America/Indiana/Tell_City", -6),
    ("America/Menominee", -6),
    ("America/North_Dakota/Center", -6),
    ("America/North_Dakota/New_Salem", -6),
    ("US/Central", -6),
    ("America/Denver", -7),
    ("America/Boise", -7),
    ("America/Phoenix", -7),
    ("US/Mountain", -7),
    ("US/Arizona", -7),
    ("America/Los_Angeles", -8),
    ("US/Pacific", -8),
    ("America/Anchorage", -9),
    ("Pacific/Honolulu", -10),
];

pub fn standard_utc_offset(timezone: &str) -> Option<i32> {
    STANDARD_UTC_OFFSETS
        .iter()
        .find(|(tz, _)| *tz == timezone)
        .map(|&(_, offset)| offset)
}

/// Standard UTC offset of every plant with a known time zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlantUtcOffsets {
    offsets: HashMap<i64, i32>,
}

impl PlantUtcOffsets {
    pub fn from_plants(plants: &[PlantEntityEia]) -> Self {
        let mut offsets = HashMap::with_capacity(plants.len());
        for plant in plants {
            match plant.timezone.as_deref().map(|tz| (tz, standard_utc_offset(tz))) {
                Some((_, Some(offset))) => {
                    offsets.insert(plant.plant_id_eia, offset);
                }
                Some((tz, None)) => {
                    warn!(plant_id_eia = plant.plant_id_eia, timezone = %tz, "Unrecognised time zone");
                }
                None => {
                    debug!(plant_id_eia = plant.plant_id_eia, "Plant has no time zone");
                }
            }
        }
        Self { offsets }
    }

    pub fn get(&self, plant_id_eia: i64) -> Option<i32> {
        self.offsets.get(&plant_id_eia).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl FromIterator<(i64, i32)> for PlantUtcOffsets {
    fn from_iter<I: IntoIterator<Item = (i64, i32)>>(iter: I) -> Self {
        Self {
            offsets: iter.into_iter().collect(),
        }
    }
}

/// One row of a raw monthly EPA CEMS file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCemsRecord {
    #[serde(rename = "STATE")]
    pub state: String,
    #[serde(rename = "ORISPL_CODE")]
    pub orispl_code: i64,
    #[serde(rename = "UNITID")]
    pub unitid: String,
    #[serde(rename = "OP_DATE")]
    pub op_date: String,
    #[serde(rename = "OP_HOUR")]
    pub op_hour: u32,
    #[serde(rename = "OP_TIME", default)]
    pub op_time: Option<f64>,
    #[serde(rename = "GLOAD (MW)", alias = "GLOAD", default)]
    pub gload_mw: Option<f64>,
    #[serde(rename = "SLOAD (1000 lbs)", alias = "SLOAD (1000lbs)", alias = "SLOAD", default)]
    pub sload_1000_lbs: Option<f64>,
    #[serde(rename = "SO2_MASS (lbs)", alias = "SO2_MASS", default)]
    pub so2_mass_lbs: Option<f64>,
    #[serde(rename = "SO2_MASS_MEASURE_FLG", default)]
    pub so2_mass_measure_flg: Option<String>,
    #[serde(rename = "NOX_RATE (lbs/mmBtu)", alias = "NOX_RATE", default)]
    pub nox_rate_lbs_mmbtu: Option<f64>,
    #[serde(rename = "NOX_RATE_MEASURE_FLG", default)]
    pub nox_rate_measure_flg: Option<String>,
    #[serde(rename = "NOX_MASS (lbs)", alias = "NOX_MASS", default)]
    pub nox_mass_lbs: Option<f64>,
    #[serde(rename = "NOX_MASS_MEASURE_FLG", default)]
    pub nox_mass_measure_flg: Option<String>,
    #[serde(rename = "CO2_MASS (tons)", alias = "CO2_MASS", default)]
    pub co2_mass_tons: Option<f64>,
    #[serde(rename = "CO2_MASS_MEASURE_FLG", default)]
    pub co2_mass_measure_flg: Option<String>,
    #[serde(rename = "HEAT_INPUT (mmBtu)", alias = "HEAT_INPUT", default)]
    pub heat_input_mmbtu: Option<f64>,
    #[serde(rename = "FAC_ID", default)]
    pub fac_id: Option<i64>,
    #[serde(rename = "UNIT_ID", default)]
    pub unit_id: Option<i64>,
}

/// One row of `hourly_emissions_epacems`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEmission {
    pub state: String,
    pub plant_id_eia: i64,
    pub unitid: String,
    pub operating_datetime_utc: NaiveDateTime,
    pub operating_time_hours: Option<f64>,
    pub gross_load_mw: Option<f64>,
    pub steam_load_1000_lbs: Option<f64>,
    pub so2_mass_lbs: Option<f64>,
    pub so2_mass_measurement_code: Option<String>,
    pub nox_rate_lbs_mmbtu: Option<f64>,
    pub nox_rate_measurement_code: Option<String>,
    pub nox_mass_lbs: Option<f64>,
    pub nox_mass_measurement_code: Option<String>,
    pub co2_mass_tons: Option<f64>,
    pub co2_mass_measurement_code: Option<String>,
    pub heat_content_mmbtu: Option<f64>,
    pub facility_id: Option<i64>,
    pub unit_id_epa: Option<i64>,
    pub year: i32,
}

impl TableRecord for HourlyEmission {
    const COLUMNS: &'static [&'static str] = &[
        "state",
        "plant_id_eia",
        "unitid",
        "operating_datetime_utc",
        "operating_time_hours",
        "gross_load_mw",
        "steam_load_1000_lbs",
        "so2_mass_lbs",
        "so2_mass_measurement_code",
        "nox_rate_lbs_mmbtu",
        "nox_rate_measurement_code",
        "nox_mass_lbs",
        "nox_mass_measurement_code",
        "co2_mass_tons",
        "co2_mass_measurement_code",
        "heat_content_mmbtu",
        "facility_id",
        "unit_id_epa",
        "year",
    ];
}

/// Parse one raw monthly file
pub fn extract_month(file_name: &str, bytes: &[u8]) -> Result<Vec<RawCemsRecord>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let records = reader
        .deserialize()
        .collect::<Result<Vec<RawCemsRecord>, _>>()
        .map_err(|source| ExtractError::Parse {
            file: file_name.to_string(),
            source,
        })?;
    debug!(file = %file_name, rows = records.len(), "Parsed raw CEMS file");
    Ok(records)
}

/// Parse `OP_DATE`, which EPA publishes as `MM-DD-YYYY`
pub fn parse_op_date(value: &str) -> Result<NaiveDate, TransformError> {
    NaiveDate::parse_from_str(value, "%m-%d-%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|e| TransformError::InvalidValue {
            column: "OP_DATE".to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Convert a local standard time hour to UTC
pub fn to_utc(date: NaiveDate, hour: u32, utc_offset_hours: i32) -> Result<NaiveDateTime, TransformError> {
    let local = date.and_hms_opt(hour, 0, 0).ok_or_else(|| TransformError::InvalidValue {
        column: "OP_HOUR".to_string(),
        value: hour.to_string(),
        reason: "hour must be between 0 and 23".to_string(),
    })?;
    Ok(local - TimeDelta::hours(i64::from(utc_offset_hours)))
}

fn clean_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// Transform the raw rows of a partition into `hourly_emissions_epacems` rows
pub fn transform(
    partition: &EpaCemsPartition,
    raw: Vec<RawCemsRecord>,
    offsets: &PlantUtcOffsets,
) -> Result<Vec<HourlyEmission>, TransformError> {
    raw.into_iter()
        .map(|record| {
            let offset = offsets
                .get(record.orispl_code)
                .ok_or(TransformError::MissingUtcOffset {
                    plant_id: record.orispl_code,
                })?;
            let date = parse_op_date(&record.op_date)?;
            let operating_datetime_utc = to_utc(date, record.op_hour, offset)?;

            Ok(HourlyEmission {
                state: partition.state.clone(),
                plant_id_eia: record.orispl_code,
                unitid: record.unitid,
                operating_datetime_utc,
                operating_time_hours: record.op_time,
                gross_load_mw: record.gload_mw,
                steam_load_1000_lbs: record.sload_1000_lbs,
                so2_mass_lbs: record.so2_mass_lbs,
                so2_mass_measurement_code: clean_code(record.so2_mass_measure_flg),
                nox_rate_lbs_mmbtu: record.nox_rate_lbs_mmbtu,
                nox_rate_measurement_code: clean_code(record.nox_rate_measure_flg),
                nox_mass_lbs: record.nox_mass_lbs,
                nox_mass_measurement_code: clean_code(record.nox_mass_measure_flg),
                co2_mass_tons: record.co2_mass_tons,
                co2_mass_measurement_code: clean_code(record.co2_mass_measure_flg),
                heat_content_mmbtu: record.heat_input_mmbtu,
                facility_id: record.fac_id,
                unit_id_epa: record.unit_id,
                year: partition.year,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RAW_MONTH: &str = "\
STATE,FACILITY_NAME,ORISPL_CODE,UNITID,OP_DATE,OP_HOUR,OP_TIME,GLOAD (MW),SLOAD (1000 lbs),SO2_MASS (lbs),SO2_MASS_MEASURE_FLG,SO2_RATE (lbs/mmBtu),SO2_RATE_MEASURE_FLG,NOX_RATE (lbs/mmBtu),NOX_RATE_MEASURE_FLG,NOX_MASS (lbs),NOX_MASS_MEASURE_FLG,CO2_MASS (tons),CO2_MASS_MEASURE_FLG,CO2_RATE (tons/mmBtu),CO2_RATE_MEASURE_FLG,HEAT_INPUT (mmBtu),FAC_ID,UNIT_ID
ID,Rathdrum Power,7350,CTG1,01-01-2018,0,1.00,150.5,,0.4,Measured,0.001,Calculated,0.01,Measured,20.1,Measured,100.2,Measured,0.059,Calculated,1000.0,1,2
ID,Rathdrum Power,7350,CTG1,01-01-2018,23,0.00,,,,,,,,,,,,,,,,1,2
";

    fn plants() -> Vec<PlantEntityEia> {
        vec![
            PlantEntityEia {
                plant_id_eia: 7350,
                plant_name_eia: "Rathdrum".to_string(),
                state: Some("ID".to_string()),
                timezone: Some("America/Los_Angeles".to_string()),
            },
            PlantEntityEia {
                plant_id_eia: 1,
                plant_name_eia: "Nowhere".to_string(),
                state: None,
                timezone: Some("Mars/Olympus_Mons".to_string()),
            },
        ]
    }

    #[test]
    fn test_offsets_from_plants() {
        let offsets = PlantUtcOffsets::from_plants(&plants());
        assert_eq!(offsets.get(7350), Some(-8));
        assert_eq!(offsets.get(1), None);
        assert_eq!(offsets.len(), 1);
    }

    #[test]
    fn test_extract_and_transform_month() {
        let partition = EpaCemsPartition::new(2018, "id").unwrap();
        let raw = extract_month("epacems2018id01.csv", RAW_MONTH.as_bytes()).unwrap();
        assert_eq!(raw.len(), 2);

        let rows = transform(&partition, raw, &PlantUtcOffsets::from_plants(&plants())).unwrap();

        assert_eq!(rows[0].state, "ID");
        assert_eq!(rows[0].year, 2018);
        assert_eq!(rows[0].operating_datetime_utc.to_string(), "2018-01-01 08:00:00");
        assert_eq!(rows[0].gross_load_mw, Some(150.5));
        assert_eq!(rows[0].steam_load_1000_lbs, None);
        assert_eq!(rows[0].nox_rate_measurement_code.as_deref(), Some("Measured"));
        assert_eq!(rows[1].operating_datetime_utc.to_string(), "2018-01-02 07:00:00");
        assert_eq!(rows[1].so2_mass_measurement_code, None);
    }

    #[test]
    fn test_missing_offset_fails() {
        let partition = EpaCemsPartition::new(2018, "ID").unwrap();
        let raw = extract_month("epacems2018id01.csv", RAW_MONTH.as_bytes()).unwrap();

        let err = transform(&partition, raw, &PlantUtcOffsets::default()).unwrap_err();
        assert!(matches!(err, TransformError::MissingUtcOffset { plant_id: 7350 }));
    }

    #[test]
    fn test_malformed_file_is_extract_error() {
        let err = extract_month("epacems2018id01.csv", b"STATE,ORISPL_CODE\nID,abc\n").unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn test_invalid_hour() {
        let date = parse_op_date("01-31-2018").unwrap();
        assert!(to_utc(date, 24, -5).is_err());
    }

    #[test]
    fn test_columns_match_catalog() {
        let catalog = pudl_datapkg::SchemaCatalog::embedded().unwrap();
        let schema = &catalog.lookup("hourly_emissions_epacems_2018_id").unwrap().schema;
        let fields: Vec<&str> = schema.field_names().collect();
        assert_eq!(fields, HourlyEmission::COLUMNS);
    }

    proptest! {
        #[test]
        fn utc_hour_differs_by_offset(day in 1u32..=28, hour in 0u32..24, offset in -10i32..=-5) {
            let date = NaiveDate::from_ymd_opt(2018, 3, day).unwrap();
            let utc = to_utc(date, hour, offset).unwrap();
            let local = date.and_hms_opt(hour, 0, 0).unwrap();
            prop_assert_eq!((utc - local).num_hours(), i64::from(-offset));
        }
    }
}
