//! EIA 860 plant extract and entity harvesting

use crate::error::ExtractError;
use crate::store::TableRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Datastore dataset holding the raw EIA 860 files
pub const DATASET: &str = "eia860";

pub const PLANTS_TABLE: &str = "plants_eia";
pub const PLANTS_ENTITY_TABLE: &str = "plants_entity_eia";

/// Raw file of one report year, relative to the dataset directory
pub fn plants_file_name(year: i32) -> String {
    format!("{}/plants.csv", year)
}

/// One row of a yearly EIA 860 plant file, accepting both the published
/// column titles and PUDL column names
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPlant {
    #[serde(alias = "Plant Code", alias = "Plant Id")]
    pub plant_id_eia: i64,
    #[serde(alias = "Plant Name")]
    pub plant_name_eia: String,
    #[serde(alias = "State", default)]
    pub state: Option<String>,
    #[serde(alias = "Time Zone", alias = "Timezone", default)]
    pub timezone: Option<String>,
}

/// One row of `plants_eia`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantEia {
    pub plant_id_eia: i64,
    pub plant_name_eia: String,
}

impl TableRecord for PlantEia {
    const COLUMNS: &'static [&'static str] = &["plant_id_eia", "plant_name_eia"];
}

/// One row of `plants_entity_eia`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantEntityEia {
    pub plant_id_eia: i64,
    pub plant_name_eia: String,
    pub state: Option<String>,
    pub timezone: Option<String>,
}

impl TableRecord for PlantEntityEia {
    const COLUMNS: &'static [&'static str] = &["plant_id_eia", "plant_name_eia", "state", "timezone"];
}

pub fn extract_plants(file_name: &str, bytes: &[u8]) -> Result<Vec<RawPlant>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let plants = reader
        .deserialize()
        .collect::<Result<Vec<RawPlant>, _>>()
        .map_err(|source| ExtractError::Parse {
            file: file_name.to_string(),
            source,
        })?;
    debug!(file = %file_name, rows = plants.len(), "Parsed raw EIA 860 plants");
    Ok(plants)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Collapse yearly plant rows into one entity per plant
///
/// Names come from the most recent year reporting the plant; state and
/// time zone from the most recent year reporting a non-empty value.
/// Output is ordered by plant id.
pub fn harvest_plants(reports: Vec<(i32, Vec<RawPlant>)>) -> (Vec<PlantEia>, Vec<PlantEntityEia>) {
    let mut reports = reports;
    reports.sort_by_key(|(year, _)| *year);

    let mut entities: BTreeMap<i64, PlantEntityEia> = BTreeMap::new();
    for (_, plants) in reports {
        for raw in plants {
            let state = non_empty(raw.state).map(|s| s.to_uppercase());
            let timezone = non_empty(raw.timezone);
            let entity = entities.entry(raw.plant_id_eia).or_insert_with(|| PlantEntityEia {
                plant_id_eia: raw.plant_id_eia,
                plant_name_eia: String::new(),
                state: None,
                timezone: None,
            });

            entity.plant_name_eia = raw.plant_name_eia.trim().to_string();
            if state.is_some() {
                entity.state = state;
            }
            if timezone.is_some() {
                entity.timezone = timezone;
            }
        }
    }

    let entities: Vec<PlantEntityEia> = entities.into_values().collect();
    let plants = entities
        .iter()
        .map(|e| PlantEia {
            plant_id_eia: e.plant_id_eia,
            plant_name_eia: e.plant_name_eia.clone(),
        })
        .collect();
    (plants, entities)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_published_headers() {
        let csv = "Plant Code,Plant Name,State,Time Zone,Latitude\n3,Barry,AL,America/Chicago,31.0\n";
        let plants = extract_plants("2018/plants.csv", csv.as_bytes()).unwrap();
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].plant_id_eia, 3);
        assert_eq!(plants[0].timezone.as_deref(), Some("America/Chicago"));
    }

    #[test]
    fn test_harvest_keeps_most_recent_values() {
        let year = |plants: &str| extract_plants("plants.csv", plants.as_bytes()).unwrap();
        let reports = vec![
            (2018, year("plant_id_eia,plant_name_eia,state,timezone\n3,Barry Steam,,\n")),
            (2017, year("plant_id_eia,plant_name_eia,state,timezone\n3,Barry,al,America/Chicago\n7350,Rathdrum,ID,America/Los_Angeles\n")),
        ];

        let (plants, entities) = harvest_plants(reports);

        assert_eq!(plants.len(), 2);
        assert_eq!(entities[0].plant_id_eia, 3);
        assert_eq!(entities[0].plant_name_eia, "Barry Steam");
        assert_eq!(entities[0].state.as_deref(), Some("AL"));
        assert_eq!(entities[0].timezone.as_deref(), Some("America/Chicago"));
        assert_eq!(plants[1].plant_name_eia, "Rathdrum");
    }

    #[test]
    fn test_columns_match_catalog() {
        let catalog = pudl_datapkg::SchemaCatalog::embedded().unwrap();
        for (table, columns) in [
            (PLANTS_TABLE, PlantEia::COLUMNS),
            (PLANTS_ENTITY_TABLE, PlantEntityEia::COLUMNS),
        ] {
            let fields: Vec<&str> = catalog.lookup(table).unwrap().schema.field_names().collect();
            assert_eq!(fields, columns, "{table}");
        }
    }
}
