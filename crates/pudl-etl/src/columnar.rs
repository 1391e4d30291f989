//! Columnar EPA CEMS dataset
//!
//! Alongside the gzipped package resources, every (year, state) partition is
//! written as one parquet file of a hive partitioned dataset:
//!
//! ```text
//! <root>/epacems/year=2018/state=ID/hourly_emissions_epacems_2018_id.parquet
//! ```
//!
//! `year` and `state` live in the directory names, not in the file. Each
//! partition task adds or replaces only its own file, so the dataset grows
//! incrementally as tasks finish.

use crate::epacems::HourlyEmission;
use crate::error::StoreError;
use crate::store::WriteSummary;
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use pudl_common::EpaCemsPartition;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Directory of the CEMS dataset under the parquet root
pub const EPACEMS_DIR: &str = "epacems";

pub fn hourly_emissions_schema() -> Arc<Schema> {
    let utc = DataType::Timestamp(TimeUnit::Second, Some("UTC".into()));
    Arc::new(Schema::new(vec![
        Field::new("plant_id_eia", DataType::Int64, false),
        Field::new("unitid", DataType::Utf8, false),
        Field::new("operating_datetime_utc", utc, false),
        Field::new("operating_time_hours", DataType::Float64, true),
        Field::new("gross_load_mw", DataType::Float64, true),
        Field::new("steam_load_1000_lbs", DataType::Float64, true),
        Field::new("so2_mass_lbs", DataType::Float64, true),
        Field::new("so2_mass_measurement_code", DataType::Utf8, true),
        Field::new("nox_rate_lbs_mmbtu", DataType::Float64, true),
        Field::new("nox_rate_measurement_code", DataType::Utf8, true),
        Field::new("nox_mass_lbs", DataType::Float64, true),
        Field::new("nox_mass_measurement_code", DataType::Utf8, true),
        Field::new("co2_mass_tons", DataType::Float64, true),
        Field::new("co2_mass_measurement_code", DataType::Utf8, true),
        Field::new("heat_content_mmbtu", DataType::Float64, true),
        Field::new("facility_id", DataType::Int64, true),
        Field::new("unit_id_epa", DataType::Int64, true),
    ]))
}

/// The parquet copy of the CEMS partitions under one root directory
#[derive(Debug, Clone)]
pub struct ParquetDataset {
    root: PathBuf,
}

impl ParquetDataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every CEMS partition
    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join(EPACEMS_DIR)
    }

    pub fn partition_path(&self, partition: &EpaCemsPartition) -> PathBuf {
        self.dataset_dir()
            .join(format!("year={}", partition.year))
            .join(format!("state={}", partition.state))
            .join(format!("{}.parquet", partition.resource_name()))
    }

    /// Write one partition, replacing a previous copy of the same partition
    pub fn write_partition(
        &self,
        partition: &EpaCemsPartition,
        rows: &[HourlyEmission],
    ) -> Result<WriteSummary, StoreError> {
        let path = self.partition_path(partition);
        let Some(dir) = path.parent() else {
            return Err(StoreError::NotFound(path.display().to_string()));
        };
        std::fs::create_dir_all(dir)?;
        let tmp_path = dir.join(format!(".{}.parquet.tmp", partition.resource_name()));

        if let Err(e) = write_batch(&tmp_path, rows) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        std::fs::rename(&tmp_path, &path)?;

        debug!(partition = %partition, rows = rows.len(), path = %path.display(), "Wrote parquet partition");
        Ok(WriteSummary {
            path,
            rows: rows.len(),
        })
    }
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some(concat!("pudl-etl ", env!("CARGO_PKG_VERSION")).to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

fn write_batch(path: &Path, rows: &[HourlyEmission]) -> Result<(), StoreError> {
    let schema = hourly_emissions_schema();
    let batch = record_batch(Arc::clone(&schema), rows)?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn record_batch(schema: Arc<Schema>, rows: &[HourlyEmission]) -> Result<RecordBatch, StoreError> {
    let floats = |f: fn(&HourlyEmission) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let codes = |f: fn(&HourlyEmission) -> Option<&str>| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let plant_ids = Int64Array::from(rows.iter().map(|r| r.plant_id_eia).collect::<Vec<_>>());
    let unit_ids = StringArray::from(rows.iter().map(|r| r.unitid.as_str()).collect::<Vec<_>>());
    let timestamps = TimestampSecondArray::from(
        rows.iter()
            .map(|r| r.operating_datetime_utc.and_utc().timestamp())
            .collect::<Vec<_>>(),
    )
    .with_timezone("UTC");
    let facility_ids = Int64Array::from(rows.iter().map(|r| r.facility_id).collect::<Vec<_>>());
    let unit_ids_epa = Int64Array::from(rows.iter().map(|r| r.unit_id_epa).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(plant_ids),
            Arc::new(unit_ids),
            Arc::new(timestamps),
            floats(|r| r.operating_time_hours),
            floats(|r| r.gross_load_mw),
            floats(|r| r.steam_load_1000_lbs),
            floats(|r| r.so2_mass_lbs),
            codes(|r| r.so2_mass_measurement_code.as_deref()),
            floats(|r| r.nox_rate_lbs_mmbtu),
            codes(|r| r.nox_rate_measurement_code.as_deref()),
            floats(|r| r.nox_mass_lbs),
            codes(|r| r.nox_mass_measurement_code.as_deref()),
            floats(|r| r.co2_mass_tons),
            codes(|r| r.co2_mass_measurement_code.as_deref()),
            floats(|r| r.heat_content_mmbtu),
            Arc::new(facility_ids),
            Arc::new(unit_ids_epa),
        ],
    )?;
    Ok(batch)
}
