//! EIA pipeline: harvest plant entities from the yearly EIA 860 files

use super::{Dataset, DatasetNode, DatasetPipeline, PipelineContext};
use crate::config::EiaParams;
use crate::eia::{self, PLANTS_ENTITY_TABLE, PLANTS_TABLE};
use crate::error::{ExtractError, Result, TaskError};
use crate::graph::TaskGraph;
use crate::task::{Task, TaskInputs, TaskOutput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct EiaPipeline {
    params: EiaParams,
    ctx: PipelineContext,
}

impl EiaPipeline {
    pub fn new(params: EiaParams, ctx: PipelineContext) -> Self {
        Self { params, ctx }
    }
}

impl DatasetPipeline for EiaPipeline {
    fn dataset(&self) -> Dataset {
        Dataset::Eia
    }

    fn build(&self, graph: &mut TaskGraph) -> Result<DatasetNode> {
        let task = PlantsTask {
            years: self.params.eia860_years.clone(),
            ctx: self.ctx.clone(),
        };
        let id = graph.add_task(format!("eia:{}", PLANTS_ENTITY_TABLE), Dataset::Eia, Arc::new(task))?;
        graph.declare_resource(id, PLANTS_TABLE)?;
        graph.declare_resource(id, PLANTS_ENTITY_TABLE)?;

        Ok(DatasetNode {
            dataset: Dataset::Eia,
            upstream: self.upstream(),
            partitions: Vec::new(),
            roots: vec![id],
            terminals: vec![id],
        })
    }
}

struct PlantsTask {
    years: Vec<i32>,
    ctx: PipelineContext,
}

#[async_trait]
impl Task for PlantsTask {
    async fn run(&self, _inputs: TaskInputs) -> std::result::Result<TaskOutput, TaskError> {
        if self.years.is_empty() {
            return Err(ExtractError::NoRawData {
                dataset: eia::DATASET.to_string(),
                context: "(no eia860_years configured)".to_string(),
            }
            .into());
        }

        let mut raw = Vec::with_capacity(self.years.len());
        for &year in &self.years {
            let file_name = eia::plants_file_name(year);
            let bytes = self
                .ctx
                .datastore
                .fetch(eia::DATASET, &file_name)
                .await
                .map_err(ExtractError::from)?;
            raw.push((year, file_name, bytes));
        }

        let store = Arc::clone(&self.ctx.store);
        let (plants, entities) = tokio::task::spawn_blocking(move || -> std::result::Result<_, TaskError> {
            let reports = raw
                .into_iter()
                .map(|(year, file_name, bytes)| Ok((year, eia::extract_plants(&file_name, &bytes)?)))
                .collect::<std::result::Result<Vec<_>, ExtractError>>()?;
            let (plants, entities) = eia::harvest_plants(reports);

            let plants_written = store.write_records(PLANTS_TABLE, plants)?;
            let entities_written = store.write_records(PLANTS_ENTITY_TABLE, entities)?;
            Ok((plants_written.rows, entities_written.rows))
        })
        .await
        .map_err(|e| TaskError::Panicked(e.to_string()))??;

        info!(plants, entities, years = ?self.years, "Harvested EIA plant entities");
        Ok(TaskOutput::Empty)
    }
}
