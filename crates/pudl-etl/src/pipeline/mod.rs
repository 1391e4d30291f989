//! Dataset pipelines and flow assembly
//!
//! Each dataset contributes a fragment of the task graph. [`FlowBuilder`]
//! lays the fragments out in dataset dependency order and wires every
//! dependent dataset's root tasks behind its upstream's terminal tasks.
//! When an upstream dataset is not part of the run, the tables the
//! dependent reads from it must already exist in the resource store.

pub mod eia;
pub mod epacems;

pub use eia::EiaPipeline;
pub use epacems::EpaCemsPipeline;

use crate::columnar::ParquetDataset;
use crate::config::{EiaParams, EpaCemsParams};
use crate::datastore::Datastore;
use crate::error::{EtlError, Result};
use crate::graph::{TaskGraph, TaskId};
use crate::store::ResourceStore;
use pudl_common::EpaCemsPartition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Eia,
    EpaCems,
}

impl Dataset {
    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Eia => "eia",
            Dataset::EpaCems => "epacems",
        }
    }

    /// Datasets whose outputs this one reads
    pub fn upstream(self) -> &'static [Dataset] {
        match self {
            Dataset::Eia => &[],
            Dataset::EpaCems => &[Dataset::Eia],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eia" => Ok(Dataset::Eia),
            "epacems" => Ok(Dataset::EpaCems),
            other => Err(EtlError::UnknownDataset(other.to_string())),
        }
    }
}

/// Shared handles every pipeline and task is built with
#[derive(Clone)]
pub struct PipelineContext {
    pub datastore: Arc<dyn Datastore>,
    pub store: Arc<ResourceStore>,
    pub parquet: Arc<ParquetDataset>,
}

/// A dataset's place in the task graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetNode {
    pub dataset: Dataset,
    pub upstream: Vec<Dataset>,
    /// Empty for unpartitioned datasets
    pub partitions: Vec<EpaCemsPartition>,
    /// Tasks that must wait for upstream datasets
    pub roots: Vec<TaskId>,
    /// Tasks dependents must wait for
    pub terminals: Vec<TaskId>,
}

pub trait DatasetPipeline: Send + Sync {
    fn dataset(&self) -> Dataset;

    fn upstream(&self) -> Vec<Dataset> {
        self.dataset().upstream().to_vec()
    }

    /// Tables read from upstream datasets
    fn required_tables(&self) -> &'static [&'static str] {
        &[]
    }

    /// Add this dataset's tasks to the graph
    fn build(&self, graph: &mut TaskGraph) -> Result<DatasetNode>;
}

/// Build the pipeline for one `{dataset: params}` entry of a package
pub fn pipeline_for(name: &str, params: &Value, ctx: &PipelineContext) -> Result<Box<dyn DatasetPipeline>> {
    Ok(match Dataset::from_str(name)? {
        Dataset::Eia => Box::new(EiaPipeline::new(EiaParams::from_value(params)?, ctx.clone())),
        Dataset::EpaCems => Box::new(EpaCemsPipeline::new(EpaCemsParams::from_value(params)?, ctx.clone())),
    })
}

pub struct FlowBuilder {
    store: Arc<ResourceStore>,
    pipelines: Vec<Box<dyn DatasetPipeline>>,
}

impl FlowBuilder {
    pub fn new(store: Arc<ResourceStore>) -> Self {
        Self {
            store,
            pipelines: Vec::new(),
        }
    }

    pub fn add(mut self, pipeline: Box<dyn DatasetPipeline>) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.pipelines.iter().map(|p| p.dataset()).collect()
    }

    pub fn build(self) -> Result<(TaskGraph, Vec<DatasetNode>)> {
        let order = self.dataset_order()?;
        let mut graph = TaskGraph::new();
        let mut built: BTreeMap<Dataset, DatasetNode> = BTreeMap::new();
        let mut nodes = Vec::with_capacity(order.len());

        for index in order {
            let pipeline = &self.pipelines[index];
            let dataset = pipeline.dataset();
            let upstream = pipeline.upstream();

            for up in upstream.iter().filter(|up| !built.contains_key(up)) {
                for table in pipeline.required_tables() {
                    if !self.store.contains(table) {
                        return Err(EtlError::MissingPrerequisite {
                            dataset: dataset.to_string(),
                            upstream: up.to_string(),
                            table: table.to_string(),
                            store: self.store.search_root(),
                        });
                    }
                }
                info!(dataset = %dataset, upstream = %up, "Upstream dataset not in this run, using existing tables");
            }

            let node = pipeline.build(&mut graph)?;

            for up in &upstream {
                if let Some(up_node) = built.get(up) {
                    info!(dataset = %dataset, upstream = %up, "Running after upstream dataset");
                    for &terminal in &up_node.terminals {
                        for &root in &node.roots {
                            graph.add_ordering(root, terminal)?;
                        }
                    }
                }
            }

            built.insert(dataset, node.clone());
            nodes.push(node);
        }

        Ok((graph, nodes))
    }

    /// Pipeline indices in dependency order, ties in configuration order
    fn dataset_order(&self) -> Result<Vec<usize>> {
        let mut index_of: BTreeMap<Dataset, usize> = BTreeMap::new();
        for (i, pipeline) in self.pipelines.iter().enumerate() {
            if index_of.insert(pipeline.dataset(), i).is_some() {
                return Err(EtlError::Config(format!(
                    "Dataset '{}' is configured more than once in one package",
                    pipeline.dataset()
                )));
            }
        }

        let count = self.pipelines.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents = vec![Vec::new(); count];
        for (i, pipeline) in self.pipelines.iter().enumerate() {
            for up in pipeline.upstream() {
                if let Some(&j) = index_of.get(&up) {
                    in_degree[i] += 1;
                    dependents[j].push(i);
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if order.len() != count {
            let stuck: Vec<String> = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.pipelines[i].dataset().to_string())
                .collect();
            return Err(EtlError::DatasetCycle(stuck.join(" <-> ")));
        }

        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::datastore::LocalDatastore;
    use crate::eia::{PlantEntityEia, PLANTS_ENTITY_TABLE};
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> PipelineContext {
        PipelineContext {
            datastore: Arc::new(LocalDatastore::new(dir.path().join("pudl-in"))),
            store: Arc::new(ResourceStore::new(dir.path().join("out/pudl-epacems"))),
            parquet: Arc::new(ParquetDataset::new(dir.path().join("parquet"))),
        }
    }

    fn eia(ctx: &PipelineContext) -> Box<dyn DatasetPipeline> {
        Box::new(EiaPipeline::new(EiaParams { eia860_years: vec![2018] }, ctx.clone()))
    }

    fn cems(ctx: &PipelineContext) -> Box<dyn DatasetPipeline> {
        Box::new(EpaCemsPipeline::new(
            EpaCemsParams {
                epacems_years: vec![2018],
                epacems_states: vec!["ID".to_string(), "ME".to_string()],
                partition: BTreeMap::new(),
            },
            ctx.clone(),
        ))
    }

    struct Cyclic(Dataset);

    impl DatasetPipeline for Cyclic {
        fn dataset(&self) -> Dataset {
            self.0
        }

        fn upstream(&self) -> Vec<Dataset> {
            match self.0 {
                Dataset::Eia => vec![Dataset::EpaCems],
                Dataset::EpaCems => vec![Dataset::Eia],
            }
        }

        fn build(&self, _graph: &mut TaskGraph) -> Result<DatasetNode> {
            unreachable!("cyclic datasets are rejected before building")
        }
    }

    #[test]
    fn test_dataset_names() {
        assert_eq!(Dataset::from_str("epacems").unwrap(), Dataset::EpaCems);
        assert_eq!(Dataset::EpaCems.to_string(), "epacems");
        assert!(matches!(Dataset::from_str("ferc1"), Err(EtlError::UnknownDataset(_))));
    }

    #[test]
    fn test_cems_waits_for_eia_even_when_listed_first() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let (graph, nodes) = FlowBuilder::new(Arc::clone(&ctx.store))
            .add(cems(&ctx))
            .add(eia(&ctx))
            .build()
            .unwrap();

        assert_eq!(nodes[0].dataset, Dataset::Eia);
        assert_eq!(nodes[1].partitions.len(), 2);

        let plants = graph.find("eia:plants_entity_eia").unwrap();
        let offsets = graph.find("epacems:plant_utc_offset").unwrap();
        let partition = graph.find("epacems:2018-ID").unwrap();
        assert!(graph.node(offsets).unwrap().after.contains(&plants));
        assert!(graph.node(partition).unwrap().inputs.contains(&offsets));

        let order = graph.topological_order().unwrap();
        assert_eq!(order[0], plants);
    }

    #[test]
    fn test_missing_prerequisite_fails_fast() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let err = FlowBuilder::new(Arc::clone(&ctx.store)).add(cems(&ctx)).build().unwrap_err();

        match err {
            EtlError::MissingPrerequisite { dataset, upstream, table, .. } => {
                assert_eq!(dataset, "epacems");
                assert_eq!(upstream, "eia");
                assert_eq!(table, PLANTS_ENTITY_TABLE);
            }
            other => panic!("expected missing prerequisite, got {other:?}"),
        }
    }

    #[test]
    fn test_existing_prerequisite_allows_standalone_cems() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.store
            .write_records(
                PLANTS_ENTITY_TABLE,
                vec![PlantEntityEia {
                    plant_id_eia: 7350,
                    plant_name_eia: "Rathdrum".to_string(),
                    state: Some("ID".to_string()),
                    timezone: Some("America/Los_Angeles".to_string()),
                }],
            )
            .unwrap();

        let (graph, _) = FlowBuilder::new(Arc::clone(&ctx.store)).add(cems(&ctx)).build().unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.find("eia:plants_entity_eia").is_none());
    }

    #[test]
    fn test_dataset_cycle_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let err = FlowBuilder::new(Arc::clone(&ctx.store))
            .add(Box::new(Cyclic(Dataset::Eia)))
            .add(Box::new(Cyclic(Dataset::EpaCems)))
            .build()
            .unwrap_err();
        assert!(matches!(err, EtlError::DatasetCycle(_)));
    }

    #[test]
    fn test_duplicate_dataset_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let err = FlowBuilder::new(Arc::clone(&ctx.store))
            .add(eia(&ctx))
            .add(eia(&ctx))
            .build()
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
