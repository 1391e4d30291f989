//! Resource files inside a data package directory
//!
//! Writers never leave a half-written resource behind: rows go to a hidden
//! temporary file in the same directory which is renamed over the final
//! path once complete.

use crate::error::StoreError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use pudl_common::resource::{self, Compression, DATA_DIR};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A row type with a fixed column order
pub trait TableRecord: Serialize {
    const COLUMNS: &'static [&'static str];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub rows: usize,
}

/// Reads and writes the resources of one package
///
/// Reads fall back to the other packages of the same bundle, so a dataset
/// can consume a table written earlier in the run by another package.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    package_dir: PathBuf,
    fallback_dirs: Vec<PathBuf>,
}

impl ResourceStore {
    pub fn new(package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
            fallback_dirs: Vec::new(),
        }
    }

    pub fn with_fallbacks<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.fallback_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Path a resource of this package is written to
    pub fn path(&self, resource_name: &str) -> PathBuf {
        resource::absolute_path(&self.package_dir, resource_name)
    }

    /// First existing copy of a resource, this package before fallbacks
    pub fn locate(&self, resource_name: &str) -> Option<PathBuf> {
        std::iter::once(&self.package_dir)
            .chain(self.fallback_dirs.iter())
            .map(|dir| resource::absolute_path(dir, resource_name))
            .find(|path| path.is_file())
    }

    pub fn contains(&self, resource_name: &str) -> bool {
        self.locate(resource_name).is_some()
    }

    /// Describe where lookups go, for error messages
    pub fn search_root(&self) -> PathBuf {
        self.package_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.package_dir.clone())
    }

    pub fn write_records<T, I>(&self, resource_name: &str, records: I) -> Result<WriteSummary, StoreError>
    where
        T: TableRecord,
        I: IntoIterator<Item = T>,
    {
        let path = self.path(resource_name);
        let dir = self.package_dir.join(DATA_DIR);
        std::fs::create_dir_all(&dir)?;
        let tmp_path = dir.join(format!(".{}.tmp", resource::file_name(resource_name)));

        let rows = match write_csv(&tmp_path, resource_name, records) {
            Ok(rows) => rows,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        std::fs::rename(&tmp_path, &path)?;

        debug!(resource = %resource_name, rows, path = %path.display(), "Wrote resource");
        Ok(WriteSummary { path, rows })
    }

    pub fn read_records<T: DeserializeOwned>(&self, resource_name: &str) -> Result<Vec<T>, StoreError> {
        let path = self
            .locate(resource_name)
            .ok_or_else(|| StoreError::NotFound(resource_name.to_string()))?;
        let file = BufReader::new(File::open(&path)?);
        let reader: Box<dyn Read> = match Compression::for_resource(resource_name) {
            Compression::Gzip => Box::new(GzDecoder::new(file)),
            Compression::None => Box::new(file),
        };

        let mut csv_reader = csv::Reader::from_reader(reader);
        let records = csv_reader.deserialize().collect::<Result<Vec<T>, _>>()?;
        Ok(records)
    }

    /// Resource names present in this package's data directory
    pub fn list_resources(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.package_dir.join(DATA_DIR);
        let mut names = Vec::new();

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            let name = file_name
                .strip_suffix(".csv.gz")
                .or_else(|| file_name.strip_suffix(".csv"));
            if let Some(name) = name {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

fn write_csv<T, I>(path: &Path, resource_name: &str, records: I) -> Result<usize, StoreError>
where
    T: TableRecord,
    I: IntoIterator<Item = T>,
{
    let file = BufWriter::new(File::create(path)?);

    match Compression::for_resource(resource_name) {
        Compression::Gzip => {
            let encoder = GzEncoder::new(file, flate2::Compression::default());
            let (encoder, rows) = serialize_rows(encoder, records)?;
            encoder.finish()?.flush()?;
            Ok(rows)
        }
        Compression::None => {
            let (mut file, rows) = serialize_rows(file, records)?;
            file.flush()?;
            Ok(rows)
        }
    }
}

fn serialize_rows<W, T, I>(writer: W, records: I) -> Result<(W, usize), StoreError>
where
    W: Write,
    T: TableRecord,
    I: IntoIterator<Item = T>,
{
    let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv_writer.write_record(T::COLUMNS)?;

    let mut rows = 0;
    for record in records {
        csv_writer.serialize(record)?;
        rows += 1;
    }

    let writer = csv_writer.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;
    Ok((writer, rows))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        plant_id_eia: i64,
        state: Option<String>,
    }

    impl TableRecord for Row {
        const COLUMNS: &'static [&'static str] = &["plant_id_eia", "state"];
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { plant_id_eia: 3, state: Some("AL".to_string()) },
            Row { plant_id_eia: 7350, state: None },
        ]
    }

    #[test]
    fn test_plain_resource_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::new(dir.path());

        let summary = store.write_records("plants_entity_eia", rows()).unwrap();
        assert_eq!(summary.rows, 2);
        assert!(summary.path.ends_with("data/plants_entity_eia.csv"));

        let content = std::fs::read_to_string(&summary.path).unwrap();
        assert!(content.starts_with("plant_id_eia,state\n"));
        assert_eq!(store.read_records::<Row>("plants_entity_eia").unwrap(), rows());
    }

    #[test]
    fn test_cems_resource_is_gzipped() {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::new(dir.path());

        let summary = store.write_records("hourly_emissions_epacems_2018_id", rows()).unwrap();
        assert!(summary.path.ends_with("data/hourly_emissions_epacems_2018_id.csv.gz"));

        let bytes = std::fs::read(&summary.path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(store.read_records::<Row>("hourly_emissions_epacems_2018_id").unwrap(), rows());
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::new(dir.path());

        let summary = store.write_records("plants_entity_eia", Vec::<Row>::new()).unwrap();
        assert_eq!(summary.rows, 0);
        assert_eq!(std::fs::read_to_string(summary.path).unwrap(), "plant_id_eia,state\n");
    }

    #[test]
    fn test_overwrite_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::new(dir.path());

        store.write_records("plants_entity_eia", rows()).unwrap();
        store.write_records("plants_entity_eia", rows().into_iter().take(1)).unwrap();

        assert_eq!(store.read_records::<Row>("plants_entity_eia").unwrap().len(), 1);
        assert_eq!(store.list_resources().unwrap(), vec!["plants_entity_eia".to_string()]);
    }

    #[test]
    fn test_reads_fall_back_to_sibling_packages() {
        let bundle = TempDir::new().unwrap();
        let eia = ResourceStore::new(bundle.path().join("pudl-eia"));
        eia.write_records("plants_entity_eia", rows()).unwrap();

        let cems = ResourceStore::new(bundle.path().join("pudl-epacems"))
            .with_fallbacks([bundle.path().join("pudl-eia")]);
        assert!(cems.contains("plants_entity_eia"));
        assert!(!cems.path("plants_entity_eia").exists());
        assert_eq!(cems.read_records::<Row>("plants_entity_eia").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_resource() {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::new(dir.path());
        assert!(matches!(
            store.read_records::<Row>("plants_entity_eia"),
            Err(StoreError::NotFound(_))
        ));
    }
}
