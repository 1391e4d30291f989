//! Bundle orchestration
//!
//! A bundle is a set of data packages produced by one ETL run. Packages are
//! processed in dataset dependency order: build the task graph, run it, and
//! only if every task succeeded assemble the package descriptor. Later
//! packages read tables written by earlier ones.

use crate::columnar::ParquetDataset;
use crate::config::{EtlConfig, EtlSettings};
use crate::datastore::Datastore;
use crate::error::{EtlError, PackageFailure, Result};
use crate::pipeline::{pipeline_for, Dataset, FlowBuilder, PipelineContext};
use crate::scheduler::{RunReport, Scheduler};
use crate::store::ResourceStore;
use pudl_datapkg::{identity, BundleIdentity, DatapkgSettings, ForeignKeyGraph, PackageAssembler, PackageDescriptor, SchemaCatalog};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of building one package
#[derive(Debug)]
pub struct PackageOutcome {
    pub name: String,
    pub dir: PathBuf,
    pub report: RunReport,
    pub descriptor: PackageDescriptor,
}

pub struct Etl<'a> {
    config: &'a EtlConfig,
    catalog: &'a SchemaCatalog,
    fk_graph: &'a ForeignKeyGraph,
    datastore: Arc<dyn Datastore>,
}

impl<'a> Etl<'a> {
    pub fn new(
        config: &'a EtlConfig,
        catalog: &'a SchemaCatalog,
        fk_graph: &'a ForeignKeyGraph,
        datastore: Arc<dyn Datastore>,
    ) -> Self {
        Self {
            config,
            catalog,
            fk_graph,
            datastore,
        }
    }

    /// Run every package of the bundle and publish their descriptors
    ///
    /// Packages run after the packages that provide their upstream
    /// datasets. A package with failed tasks gets no descriptor, and neither
    /// does any package depending on it; unrelated packages still run.
    /// Outcomes are returned in settings order.
    pub async fn run(&self, settings: &EtlSettings) -> Result<Vec<PackageOutcome>> {
        let bundle_uuid = Uuid::new_v4().to_string();
        check_bundle_doi(settings)?;
        let plan = package_order(settings)?;

        let bundle_dir = self.config.bundle_dir(&settings.datapkg_bundle_name);
        let mut output_dirs = vec![bundle_dir.clone()];
        if settings
            .datapkg_bundle_settings
            .iter()
            .any(|p| p.dataset_names().any(|d| d == Dataset::EpaCems.as_str()))
        {
            output_dirs.push(ParquetDataset::new(self.config.parquet_dir()).dataset_dir());
        }
        self.prepare_output_dirs(&output_dirs)?;
        info!(
            bundle = %settings.datapkg_bundle_name,
            uuid = %bundle_uuid,
            path = %bundle_dir.display(),
            "Starting ETL run"
        );

        let packages = &settings.datapkg_bundle_settings;
        let mut outcomes: BTreeMap<usize, PackageOutcome> = BTreeMap::new();
        let mut failures: BTreeMap<usize, PackageFailure> = BTreeMap::new();
        let mut written_dirs: Vec<PathBuf> = Vec::new();

        for PackagePlan { index, upstream } in plan {
            let package = &packages[index];

            if let Some(blocker) = upstream.iter().find(|u| failures.contains_key(*u)) {
                let blocked_by = packages[*blocker].name.clone();
                warn!(package = %package.name, blocked_by = %blocked_by, "Skipping package, an upstream package failed");
                failures.insert(
                    index,
                    PackageFailure {
                        package: package.name.clone(),
                        tasks: Vec::new(),
                        blocked_by: Some(blocked_by),
                    },
                );
                continue;
            }

            let dir = bundle_dir.join(&package.name);
            let store = Arc::new(ResourceStore::new(&dir).with_fallbacks(written_dirs.iter().rev().cloned()));
            let report = self.run_package(package, Arc::clone(&store)).await?;

            if !report.is_success() {
                for task in report.failed() {
                    error!(
                        package = %package.name,
                        task = %task.name,
                        error = task.error.as_deref().unwrap_or_default(),
                        "Task did not complete"
                    );
                }
                failures.insert(
                    index,
                    PackageFailure {
                        package: package.name.clone(),
                        tasks: report.failed().map(|t| t.name.clone()).collect(),
                        blocked_by: None,
                    },
                );
                continue;
            }

            let resources = report.resources_written();
            let descriptor = PackageAssembler::new(self.catalog, self.fk_graph).assemble(
                package,
                &resources,
                &dir,
                BundleIdentity {
                    uuid: Some(&bundle_uuid),
                    doi: settings.datapkg_bundle_doi.as_deref(),
                },
            )?;

            written_dirs.push(dir.clone());
            outcomes.insert(
                index,
                PackageOutcome {
                    name: package.name.clone(),
                    dir,
                    report,
                    descriptor,
                },
            );
        }

        let outcomes: Vec<PackageOutcome> = outcomes.into_values().collect();
        if !failures.is_empty() {
            error!(
                bundle = %settings.datapkg_bundle_name,
                published = outcomes.len(),
                failed = failures.len(),
                "ETL run finished with failed packages"
            );
            return Err(EtlError::PackagesFailed {
                failed: failures.into_values().collect(),
                published: outcomes.into_iter().map(|o| o.name).collect(),
            });
        }

        info!(bundle = %settings.datapkg_bundle_name, packages = outcomes.len(), "ETL run complete");
        Ok(outcomes)
    }

    async fn run_package(&self, package: &DatapkgSettings, store: Arc<ResourceStore>) -> Result<RunReport> {
        info!(package = %package.name, "Building package");
        let ctx = PipelineContext {
            datastore: Arc::clone(&self.datastore),
            store: Arc::clone(&store),
            parquet: Arc::new(ParquetDataset::new(self.config.parquet_dir())),
        };

        let mut builder = FlowBuilder::new(store);
        for (name, params) in package.datasets.iter().flat_map(|d| d.iter()) {
            builder = builder.add(pipeline_for(name, params, &ctx)?);
        }
        let (graph, nodes) = builder.build()?;
        for node in &nodes {
            info!(
                package = %package.name,
                dataset = %node.dataset,
                partitions = node.partitions.len(),
                "Dataset scheduled"
            );
        }

        Scheduler::new(self.config.concurrency).run(graph).await
    }

    /// Refuse to touch existing outputs unless clobbering, then start them empty
    fn prepare_output_dirs(&self, dirs: &[PathBuf]) -> Result<()> {
        if !self.config.clobber {
            if let Some(existing) = dirs.iter().find(|d| d.exists()) {
                return Err(EtlError::Config(format!(
                    "{} already exists, set PUDL_CLOBBER=true to replace it",
                    existing.display()
                )));
            }
        }
        for dir in dirs {
            if dir.exists() {
                warn!(path = %dir.display(), "Clobbering existing output");
                std::fs::remove_dir_all(dir)?;
            }
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Regenerate descriptors for packages whose resources are already on disk
pub fn assemble_bundle(
    config: &EtlConfig,
    settings: &EtlSettings,
    catalog: &SchemaCatalog,
    fk_graph: &ForeignKeyGraph,
) -> Result<Vec<PackageDescriptor>> {
    check_bundle_doi(settings)?;
    let bundle_uuid = Uuid::new_v4().to_string();
    let assembler = PackageAssembler::new(catalog, fk_graph);

    settings
        .datapkg_bundle_settings
        .iter()
        .map(|package| {
            let dir = config.package_dir(&settings.datapkg_bundle_name, &package.name);
            let resources = ResourceStore::new(&dir).list_resources()?;
            let descriptor = assembler.assemble(
                package,
                &resources,
                &dir,
                BundleIdentity {
                    uuid: Some(&bundle_uuid),
                    doi: settings.datapkg_bundle_doi.as_deref(),
                },
            )?;
            Ok(descriptor)
        })
        .collect()
}

/// A package and the packages providing its upstream datasets
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackagePlan {
    index: usize,
    upstream: BTreeSet<usize>,
}

/// Order packages so each runs after the packages providing datasets it
/// reads and does not provide itself. Ties keep settings order.
fn package_order(settings: &EtlSettings) -> Result<Vec<PackagePlan>> {
    let packages = &settings.datapkg_bundle_settings;
    let datasets = packages
        .iter()
        .map(|p| p.dataset_names().map(Dataset::from_str).collect::<Result<BTreeSet<_>>>())
        .collect::<Result<Vec<_>>>()?;

    let mut providers: BTreeMap<Dataset, Vec<usize>> = BTreeMap::new();
    for (index, provided) in datasets.iter().enumerate() {
        for &dataset in provided {
            providers.entry(dataset).or_default().push(index);
        }
    }

    let upstream: Vec<BTreeSet<usize>> = datasets
        .iter()
        .enumerate()
        .map(|(index, provided)| {
            provided
                .iter()
                .flat_map(|d| d.upstream())
                .filter(|up| !provided.contains(*up))
                .flat_map(|up| providers.get(up).into_iter().flatten().copied())
                .filter(|&other| other != index)
                .collect()
        })
        .collect();

    let mut in_degree: Vec<usize> = upstream.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..packages.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut plan = Vec::with_capacity(packages.len());

    while let Some(index) = ready.pop_first() {
        plan.push(PackagePlan {
            index,
            upstream: upstream[index].clone(),
        });
        for (dependent, ups) in upstream.iter().enumerate() {
            if ups.contains(&index) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if plan.len() != packages.len() {
        let stuck: Vec<&str> = (0..packages.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| packages[i].name.as_str())
            .collect();
        return Err(EtlError::DatasetCycle(format!("packages {}", stuck.join(" <-> "))));
    }

    if plan.iter().enumerate().any(|(position, step)| position != step.index) {
        let order: Vec<&str> = plan.iter().map(|p| packages[p.index].name.as_str()).collect();
        info!(order = ?order, "Reordered packages to follow dataset dependencies");
    }
    Ok(plan)
}

/// An invalid DOI must stop the run before any data is written
fn check_bundle_doi(settings: &EtlSettings) -> Result<()> {
    if let Some(doi) = settings.datapkg_bundle_doi.as_deref() {
        identity::validate_doi(&settings.datapkg_bundle_name, doi)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn settings(packages: &[(&str, &str)]) -> EtlSettings {
        let mut yaml = String::from("datapkg_bundle_name: pudl-test\ndatapkg_bundle_settings:\n");
        for (name, datasets) in packages {
            yaml.push_str(&format!(
                "  - name: {name}\n    title: {name}\n    description: {name}\n    datasets:\n{datasets}"
            ));
        }
        EtlSettings::from_yaml_str(&yaml).unwrap()
    }

    const EIA: &str = "      - eia:\n          eia860_years: [2018]\n";
    const CEMS: &str = "      - epacems:\n          epacems_years: [2018]\n          epacems_states: [ID]\n";

    fn order(plan: &[PackagePlan]) -> Vec<usize> {
        plan.iter().map(|p| p.index).collect()
    }

    #[test]
    fn test_cems_package_runs_after_eia_package() {
        let plan = package_order(&settings(&[("pudl-epacems", CEMS), ("pudl-eia", EIA)])).unwrap();
        assert_eq!(order(&plan), vec![1, 0]);
        assert_eq!(plan[1].upstream, BTreeSet::from([1]));
        assert!(plan[0].upstream.is_empty());
    }

    #[test]
    fn test_independent_packages_keep_settings_order() {
        let both = format!("{EIA}{CEMS}");
        let plan = package_order(&settings(&[("pudl-all", both.as_str()), ("pudl-eia", EIA)])).unwrap();
        assert_eq!(order(&plan), vec![0, 1]);
        assert!(plan.iter().all(|p| p.upstream.is_empty()));
    }

    #[test]
    fn test_cems_package_waits_for_every_eia_provider() {
        let plan = package_order(&settings(&[
            ("pudl-epacems", CEMS),
            ("pudl-eia-a", EIA),
            ("pudl-eia-b", EIA),
        ]))
        .unwrap();
        assert_eq!(order(&plan), vec![1, 2, 0]);
        assert_eq!(plan[2].upstream, BTreeSet::from([1, 2]));
    }
}
