//! Data conformance checks
//!
//! Reads every resource file of a package and checks its rows against the
//! declared schema: header, field types, required values, primary key
//! uniqueness, and foreign keys into tables that are part of the same
//! package. References to tables outside the package cannot be checked and
//! are skipped.
//!
//! Errors are grouped per (code, field) and keep at most
//! [`MAX_SAMPLE_VALUES`] offending values, so even a file with millions of
//! bad rows produces a readable report.

use crate::catalog::{FieldType, ForeignKey};
use crate::resource::ResourceDescriptor;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Offending values kept per error
pub const MAX_SAMPLE_VALUES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// File missing, unreadable, or not parseable as CSV
    SourceError,
    HeaderMismatch,
    TypeOrFormatError,
    RequiredConstraint,
    PrimaryKeyConstraint,
    ForeignKeyConstraint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataError {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    /// Number of offending rows, not capped
    pub count: usize,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub path: String,
    pub rows: usize,
    pub errors: Vec<DataError>,
}

impl TableReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataReport {
    pub tables: Vec<TableReport>,
}

impl DataReport {
    pub fn is_valid(&self) -> bool {
        self.tables.iter().all(TableReport::is_valid)
    }

    /// Errors of the failing tables only, keyed by path
    pub fn compact(&self) -> BTreeMap<&str, Vec<DataError>> {
        self.tables
            .iter()
            .filter(|t| !t.is_valid())
            .map(|t| {
                let errors = t
                    .errors
                    .iter()
                    .map(|e| DataError {
                        values: e.values.iter().take(MAX_SAMPLE_VALUES).cloned().collect(),
                        ..e.clone()
                    })
                    .collect();
                (t.path.as_str(), errors)
            })
            .collect()
    }

    /// One line per failing table, e.g. `data/x.csv: type-or-format-error on year (3)`
    pub fn summary(&self) -> String {
        self.tables
            .iter()
            .filter(|t| !t.is_valid())
            .map(|t| {
                let errors: Vec<String> = t
                    .errors
                    .iter()
                    .map(|e| match e.field {
                        Some(ref field) => format!("{} on {} ({})", code_name(e.code), field, e.count),
                        None => format!("{} ({})", code_name(e.code), e.count),
                    })
                    .collect();
                format!("{}: {}", t.path, errors.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn code_name(code: ErrorCode) -> String {
    serde_json::to_value(code)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| format!("{:?}", code))
}

#[derive(Default)]
struct ErrorCollector {
    errors: BTreeMap<(ErrorCode, Option<String>), DataError>,
}

impl ErrorCollector {
    fn record(&mut self, code: ErrorCode, field: Option<&str>, message: impl FnOnce() -> String, value: &str) {
        let error = self
            .errors
            .entry((code, field.map(String::from)))
            .or_insert_with(|| DataError {
                code,
                field: field.map(String::from),
                message: message(),
                count: 0,
                values: Vec::new(),
            });
        error.count += 1;
        if error.values.len() < MAX_SAMPLE_VALUES {
            error.values.push(value.to_string());
        }
    }

    fn finish(self) -> Vec<DataError> {
        self.errors.into_values().collect()
    }
}

/// Whether a non-empty CSV value is a valid instance of `field_type`
pub fn value_conforms(field_type: FieldType, value: &str) -> bool {
    match field_type {
        FieldType::String => true,
        FieldType::Integer => value.parse::<i64>().is_ok(),
        FieldType::Number => value.parse::<f64>().is_ok(),
        FieldType::Boolean => matches!(
            value,
            "true" | "false" | "True" | "False" | "TRUE" | "FALSE" | "1" | "0"
        ),
        FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        FieldType::Datetime => {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
                || DateTime::parse_from_rfc3339(value).is_ok()
        }
        FieldType::Year => value.len() == 4 && value.parse::<u16>().is_ok(),
    }
}

type KeyColumns = (String, Vec<String>);

struct PendingForeignKey {
    report: usize,
    foreign_key: ForeignKey,
    tuples: HashSet<Vec<String>>,
}

/// Check every resource file of a package against its schema
pub fn validate_data(package_dir: &Path, resources: &[ResourceDescriptor]) -> DataReport {
    let tables_in_package: BTreeSet<&str> = resources.iter().map(ResourceDescriptor::table).collect();

    let mut known_keys: HashMap<KeyColumns, HashSet<Vec<String>>> = resources
        .iter()
        .flat_map(|r| r.schema.foreign_keys.iter())
        .filter(|fk| tables_in_package.contains(fk.reference.resource.as_str()))
        .map(|fk| ((fk.reference.resource.clone(), fk.reference.fields.clone()), HashSet::new()))
        .collect();

    let mut reports = Vec::with_capacity(resources.len());
    let mut collectors = Vec::with_capacity(resources.len());
    let mut pending = Vec::new();

    for (index, resource) in resources.iter().enumerate() {
        info!(resource = %resource.name, path = %resource.path, "Validating resource data");
        let mut collector = ErrorCollector::default();
        let rows = check_resource(
            package_dir,
            resource,
            index,
            &tables_in_package,
            &mut known_keys,
            &mut collector,
            &mut pending,
        );
        reports.push(TableReport {
            path: resource.path.clone(),
            rows,
            errors: Vec::new(),
        });
        collectors.push(collector);
    }

    for check in pending {
        let reference = &check.foreign_key.reference;
        let key = (reference.resource.clone(), reference.fields.clone());
        let known = known_keys.get(&key);
        let field = check.foreign_key.fields.join(",");

        for tuple in check.tuples {
            if !known.is_some_and(|k| k.contains(&tuple)) {
                collectors[check.report].record(
                    ErrorCode::ForeignKeyConstraint,
                    Some(field.as_str()),
                    || format!("value not found in {}({})", reference.resource, reference.fields.join(",")),
                    &tuple.join(","),
                );
            }
        }
    }

    for (report, collector) in reports.iter_mut().zip(collectors) {
        report.errors = collector.finish();
    }

    DataReport { tables: reports }
}

fn open_resource(package_dir: &Path, resource: &ResourceDescriptor) -> std::io::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(package_dir.join(&resource.path))?);
    if resource.is_gzipped() {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn positions(headers: &[&str], fields: &[String]) -> Vec<usize> {
    fields
        .iter()
        .filter_map(|f| headers.iter().position(|h| *h == f.as_str()))
        .collect()
}

fn key_tuple(record: &csv::StringRecord, columns: &[usize]) -> Vec<String> {
    columns
        .iter()
        .map(|&i| record.get(i).unwrap_or_default().to_string())
        .collect()
}

/// Validate one file, returning the number of data rows read
fn check_resource(
    package_dir: &Path,
    resource: &ResourceDescriptor,
    index: usize,
    tables_in_package: &BTreeSet<&str>,
    known_keys: &mut HashMap<KeyColumns, HashSet<Vec<String>>>,
    collector: &mut ErrorCollector,
    pending: &mut Vec<PendingForeignKey>,
) -> usize {
    let source_error = |collector: &mut ErrorCollector, err: &dyn std::fmt::Display| {
        collector.record(ErrorCode::SourceError, None, || "resource could not be read".to_string(), &err.to_string());
    };

    let reader = match open_resource(package_dir, resource) {
        Ok(reader) => reader,
        Err(e) => {
            source_error(collector, &e);
            return 0;
        }
    };
    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = match csv_reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            source_error(collector, &e);
            return 0;
        }
    };
    let expected: Vec<&str> = resource.schema.field_names().collect();
    if !headers.iter().eq(expected.iter().copied()) {
        collector.record(
            ErrorCode::HeaderMismatch,
            None,
            || format!("header must be {}", expected.join(",")),
            &headers.iter().collect::<Vec<_>>().join(","),
        );
        return 0;
    }

    let pk_columns = positions(&expected, &resource.schema.primary_key);
    let pk_field = resource.schema.primary_key.join(",");
    let mut seen_pk: HashSet<Vec<String>> = HashSet::new();

    let mut outgoing: Vec<(Vec<usize>, PendingForeignKey)> = resource
        .schema
        .foreign_keys
        .iter()
        .filter(|fk| tables_in_package.contains(fk.reference.resource.as_str()))
        .map(|fk| {
            (
                positions(&expected, &fk.fields),
                PendingForeignKey {
                    report: index,
                    foreign_key: fk.clone(),
                    tuples: HashSet::new(),
                },
            )
        })
        .collect();

    let incoming: Vec<(KeyColumns, Vec<usize>)> = known_keys
        .keys()
        .filter(|(table, _)| table == resource.table())
        .map(|key| (key.clone(), positions(&expected, &key.1)))
        .collect();

    let mut rows = 0;
    for record in csv_reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                source_error(collector, &e);
                break;
            }
        };
        rows += 1;

        for (field, value) in resource.schema.fields.iter().zip(record.iter()) {
            if value.is_empty() {
                if field.is_required() {
                    collector.record(
                        ErrorCode::RequiredConstraint,
                        Some(field.name.as_str()),
                        || "required value is missing".to_string(),
                        &format!("row {}", rows),
                    );
                }
                continue;
            }
            if !value_conforms(field.field_type, value) {
                collector.record(
                    ErrorCode::TypeOrFormatError,
                    Some(field.name.as_str()),
                    || format!("value is not of type {:?}", field.field_type).to_lowercase(),
                    value,
                );
            }
        }

        if !pk_columns.is_empty() {
            let key = key_tuple(&record, &pk_columns);
            if !seen_pk.insert(key.clone()) {
                collector.record(
                    ErrorCode::PrimaryKeyConstraint,
                    Some(pk_field.as_str()),
                    || "primary key values must be unique".to_string(),
                    &key.join(","),
                );
            }
        }

        for (key, columns) in &incoming {
            if let Some(values) = known_keys.get_mut(key) {
                values.insert(key_tuple(&record, columns));
            }
        }

        for (columns, check) in &mut outgoing {
            let tuple = key_tuple(&record, columns);
            if tuple.iter().all(|v| !v.is_empty()) {
                check.tuples.insert(tuple);
            }
        }
    }

    debug!(resource = %resource.name, rows, "Finished reading resource");
    pending.extend(outgoing.into_iter().map(|(_, check)| check));
    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::coverage::{Coverage, SpatialCoverage, TemporalCoverage};
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn descriptor(name: &str, gz: bool) -> ResourceDescriptor {
        let catalog = SchemaCatalog::embedded().unwrap();
        ResourceDescriptor {
            profile: "tabular-data-resource".to_string(),
            name: name.to_string(),
            path: pudl_common::resource::relative_path(name),
            title: None,
            description: String::new(),
            format: "csv".to_string(),
            mediatype: "text/csv".to_string(),
            encoding: "utf-8".to_string(),
            compression: gz.then(|| "gz".to_string()),
            bytes: 0,
            hash: String::new(),
            created: String::new(),
            schema: catalog.lookup(name).unwrap().schema.clone(),
            sources: vec![],
            coverage: Coverage {
                temporal: TemporalCoverage::unknown(),
                spatial: SpatialCoverage {
                    country: "United States of America".to_string(),
                    iso_3166_1_alpha_2: "US".to_string(),
                    iso_3166_1_alpha_3: "USA".to_string(),
                    state: None,
                    iso_3166_2: None,
                },
            },
            group: gz.then(|| "hourly_emissions_epacems".to_string()),
        }
    }

    fn write(dir: &Path, resource: &ResourceDescriptor, content: &str) {
        let path = dir.join(&resource.path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        if resource.is_gzipped() {
            let mut encoder = GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(content.as_bytes()).unwrap();
            encoder.finish().unwrap();
        } else {
            file.write_all(content.as_bytes()).unwrap();
        }
    }

    const CEMS_HEADER: &str = "state,plant_id_eia,unitid,operating_datetime_utc,operating_time_hours,gross_load_mw,steam_load_1000_lbs,so2_mass_lbs,so2_mass_measurement_code,nox_rate_lbs_mmbtu,nox_rate_measurement_code,nox_mass_lbs,nox_mass_measurement_code,co2_mass_tons,co2_mass_measurement_code,heat_content_mmbtu,facility_id,unit_id_epa,year";

    #[test]
    fn test_valid_gzipped_partition() {
        let dir = TempDir::new().unwrap();
        let resource = descriptor("hourly_emissions_epacems_2018_id", true);
        write(
            dir.path(),
            &resource,
            &format!(
                "{}\nID,7350,1,2018-01-01T07:00:00,1.0,150.5,,0.4,Measured,0.1,Calculated,20.1,Measured,100.2,Measured,1000.0,1,2,2018\n",
                CEMS_HEADER
            ),
        );

        let report = validate_data(dir.path(), &[resource]);
        assert!(report.is_valid(), "{:?}", report);
        assert_eq!(report.tables[0].rows, 1);
    }

    #[test]
    fn test_type_errors_are_sampled() {
        let dir = TempDir::new().unwrap();
        let resource = descriptor("plants_eia", false);
        let mut content = String::from("plant_id_eia,plant_name_eia\n");
        for i in 0..20 {
            content.push_str(&format!("x{},Plant {}\n", i, i));
        }
        write(dir.path(), &resource, &content);

        let report = validate_data(dir.path(), &[resource]);
        assert!(!report.is_valid());

        let compact = report.compact();
        let errors = &compact["data/plants_eia.csv"];
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::TypeOrFormatError);
        assert_eq!(errors[0].field.as_deref(), Some("plant_id_eia"));
        assert_eq!(errors[0].count, 20);
        assert_eq!(errors[0].values.len(), MAX_SAMPLE_VALUES);
        assert!(report.summary().contains("type-or-format-error on plant_id_eia (20)"));
    }

    #[test]
    fn test_header_mismatch() {
        let dir = TempDir::new().unwrap();
        let resource = descriptor("plants_eia", false);
        write(dir.path(), &resource, "plant_name_eia,plant_id_eia\nBarry,3\n");

        let report = validate_data(dir.path(), &[resource]);
        assert_eq!(report.tables[0].errors[0].code, ErrorCode::HeaderMismatch);
    }

    #[test]
    fn test_required_and_primary_key() {
        let dir = TempDir::new().unwrap();
        let resource = descriptor("plants_eia", false);
        write(dir.path(), &resource, "plant_id_eia,plant_name_eia\n3,Barry\n3,Barry 2\n,Nameless\n");

        let report = validate_data(dir.path(), &[resource]);
        let codes: Vec<_> = report.tables[0].errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::RequiredConstraint, ErrorCode::PrimaryKeyConstraint]);
    }

    #[test]
    fn test_foreign_keys_within_package() {
        let dir = TempDir::new().unwrap();
        let plants = descriptor("plants_eia", false);
        let entities = descriptor("plants_entity_eia", false);
        write(dir.path(), &plants, "plant_id_eia,plant_name_eia\n3,Barry\n");
        write(
            dir.path(),
            &entities,
            "plant_id_eia,plant_name_eia,state,timezone\n3,Barry,AL,America/Chicago\n4,Ghost,AL,America/Chicago\n",
        );

        let report = validate_data(dir.path(), &[plants, entities.clone()]);
        let errors = &report.tables[1].errors;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::ForeignKeyConstraint);
        assert_eq!(errors[0].values, vec!["4".to_string()]);

        // plants_eia is not part of this package, so the reference is not checked
        let report = validate_data(dir.path(), &[entities]);
        assert!(report.is_valid());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let report = validate_data(dir.path(), &[descriptor("plants_eia", false)]);
        assert_eq!(report.tables[0].errors[0].code, ErrorCode::SourceError);
    }

    #[test]
    fn test_value_conforms() {
        assert!(value_conforms(FieldType::Integer, "-12"));
        assert!(!value_conforms(FieldType::Integer, "1.5"));
        assert!(value_conforms(FieldType::Number, "1.5e3"));
        assert!(value_conforms(FieldType::Date, "2018-12-31"));
        assert!(!value_conforms(FieldType::Date, "12-31-2018"));
        assert!(value_conforms(FieldType::Datetime, "2018-01-01T07:00:00"));
        assert!(value_conforms(FieldType::Datetime, "2018-01-01 07:00:00"));
        assert!(value_conforms(FieldType::Datetime, "2018-01-01T07:00:00Z"));
        assert!(value_conforms(FieldType::Year, "2018"));
        assert!(!value_conforms(FieldType::Year, "18"));
        assert!(value_conforms(FieldType::Boolean, "False"));
        assert!(!value_conforms(FieldType::Boolean, "maybe"));
    }
}
