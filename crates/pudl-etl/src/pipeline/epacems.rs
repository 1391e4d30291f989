//! EPA CEMS pipeline
//!
//! One task loads plant UTC offsets from `plants_entity_eia`; one task per
//! (year, state) partition receives them and writes its own resource plus
//! its file of the parquet dataset.

use super::{Dataset, DatasetNode, DatasetPipeline, PipelineContext};
use crate::config::EpaCemsParams;
use crate::eia::{PlantEntityEia, PLANTS_ENTITY_TABLE};
use crate::epacems::{self, PlantUtcOffsets};
use crate::error::{ExtractError, Result, TaskError};
use crate::graph::TaskGraph;
use crate::task::{Task, TaskInputs, TaskOutput};
use async_trait::async_trait;
use futures::future::join_all;
use pudl_common::partition::{self, EpaCemsPartition};
use std::sync::Arc;
use tracing::{debug, info};

pub const OFFSETS_TASK: &str = "epacems:plant_utc_offset";

pub struct EpaCemsPipeline {
    params: EpaCemsParams,
    ctx: PipelineContext,
}

impl EpaCemsPipeline {
    pub fn new(params: EpaCemsParams, ctx: PipelineContext) -> Self {
        Self { params, ctx }
    }

    pub fn partitions(&self) -> Vec<EpaCemsPartition> {
        partition::enumerate(&self.params.epacems_years, &self.params.epacems_states)
    }
}

impl DatasetPipeline for EpaCemsPipeline {
    fn dataset(&self) -> Dataset {
        Dataset::EpaCems
    }

    fn required_tables(&self) -> &'static [&'static str] {
        &[PLANTS_ENTITY_TABLE]
    }

    fn build(&self, graph: &mut TaskGraph) -> Result<DatasetNode> {
        let offsets = graph.add_task(
            OFFSETS_TASK,
            Dataset::EpaCems,
            Arc::new(UtcOffsetTask {
                ctx: self.ctx.clone(),
            }),
        )?;

        let partitions = self.partitions();
        let mut terminals = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            let id = graph.add_task(
                format!("epacems:{}", partition),
                Dataset::EpaCems,
                Arc::new(PartitionTask::new(partition.clone(), self.ctx.clone())),
            )?;
            graph.add_input(id, offsets)?;
            graph.declare_resource(id, partition.resource_name())?;
            terminals.push(id);
        }
        if terminals.is_empty() {
            terminals.push(offsets);
        }

        info!(partitions = partitions.len(), "Built EPA CEMS tasks");
        Ok(DatasetNode {
            dataset: Dataset::EpaCems,
            upstream: self.upstream(),
            partitions,
            roots: vec![offsets],
            terminals,
        })
    }
}

struct UtcOffsetTask {
    ctx: PipelineContext,
}

#[async_trait]
impl Task for UtcOffsetTask {
    async fn run(&self, _inputs: TaskInputs) -> std::result::Result<TaskOutput, TaskError> {
        let store = Arc::clone(&self.ctx.store);
        let plants = tokio::task::spawn_blocking(move || store.read_records::<PlantEntityEia>(PLANTS_ENTITY_TABLE))
            .await
            .map_err(|e| TaskError::Panicked(e.to_string()))??;

        let offsets = PlantUtcOffsets::from_plants(&plants);
        info!(plants = plants.len(), with_offset = offsets.len(), "Loaded plant UTC offsets");
        Ok(TaskOutput::PlantUtcOffsets(Arc::new(offsets)))
    }
}

/// Extract, transform and write one (year, state) partition
pub struct PartitionTask {
    partition: EpaCemsPartition,
    ctx: PipelineContext,
}

impl PartitionTask {
    pub fn new(partition: EpaCemsPartition, ctx: PipelineContext) -> Self {
        Self { partition, ctx }
    }

    /// Raw monthly files that exist, in month order
    async fn fetch_months(&self) -> std::result::Result<Vec<(String, Vec<u8>)>, ExtractError> {
        let file_names = self.partition.raw_file_names();
        let fetches = file_names
            .iter()
            .map(|file_name| self.ctx.datastore.fetch(epacems::DATASET, file_name));
        let results = join_all(fetches).await;

        let mut months = Vec::new();
        for (file_name, result) in file_names.into_iter().zip(results) {
            match result {
                Ok(bytes) => months.push((file_name, bytes)),
                Err(e) if e.is_not_found() => debug!(file = %file_name, "Month not in datastore, skipping"),
                Err(e) => return Err(e.into()),
            }
        }

        if months.is_empty() {
            return Err(ExtractError::NoRawData {
                dataset: epacems::DATASET.to_string(),
                context: self.partition.to_string(),
            });
        }
        Ok(months)
    }
}

#[async_trait]
impl Task for PartitionTask {
    async fn run(&self, inputs: TaskInputs) -> std::result::Result<TaskOutput, TaskError> {
        let offsets = inputs.plant_utc_offsets()?;
        info!(partition = %self.partition, "Processing EPA CEMS partition");

        let months = self.fetch_months().await?;
        let month_count = months.len();
        let partition = self.partition.clone();
        let store = Arc::clone(&self.ctx.store);
        let parquet = Arc::clone(&self.ctx.parquet);

        let rows = tokio::task::spawn_blocking(move || -> std::result::Result<usize, TaskError> {
            let mut raw = Vec::new();
            for (file_name, bytes) in &months {
                raw.extend(epacems::extract_month(file_name, bytes)?);
            }
            let records = epacems::transform(&partition, raw, &offsets)?;
            parquet.write_partition(&partition, &records)?;
            let written = store.write_records(&partition.resource_name(), records)?;
            Ok(written.rows)
        })
        .await
        .map_err(|e| TaskError::Panicked(e.to_string()))??;

        info!(partition = %self.partition, months = month_count, rows, "Wrote EPA CEMS partition");
        Ok(TaskOutput::Empty)
    }
}
