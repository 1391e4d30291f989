//! Task graph execution
//!
//! Runs a [`TaskGraph`] on tokio with bounded concurrency. A failed task
//! only takes down the tasks that transitively depend on it; everything
//! else keeps going. No timeouts, no retries.

use crate::error::{Result, TaskError};
use crate::graph::{TaskGraph, TaskId};
use crate::pipeline::Dataset;
use crate::task::{TaskInputs, TaskOutput};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    UpstreamFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub dataset: Dataset,
    pub status: TaskStatus,
    pub duration: Duration,
    pub resources: Vec<String>,
    pub error: Option<String>,
}

/// Outcome of every task of one run, in topological order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub tasks: Vec<TaskRecord>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Succeeded)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Succeeded)
    }

    /// Tasks that failed themselves or were skipped because of an upstream failure
    pub fn failed(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status != TaskStatus::Succeeded)
    }

    pub fn record(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Resources written by successful tasks
    pub fn resources_written(&self) -> Vec<String> {
        self.succeeded().flat_map(|t| t.resources.iter().cloned()).collect()
    }
}

pub struct Scheduler {
    concurrency: usize,
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, graph: TaskGraph) -> Result<RunReport> {
        let order = graph.topological_order()?;
        let dependents = graph.dependents();
        let total = graph.len();

        let mut remaining: Vec<usize> = graph.nodes().map(|(_, node)| node.upstream().count()).collect();
        let mut outputs: Vec<Option<TaskOutput>> = vec![None; total];
        let mut records: Vec<Option<TaskRecord>> = vec![None; total];
        let mut ready: VecDeque<TaskId> = order.iter().copied().filter(|id| remaining[id.index()] == 0).collect();
        let mut in_flight = FuturesUnordered::new();

        info!(tasks = total, concurrency = self.concurrency, "Starting task graph");

        loop {
            while in_flight.len() < self.concurrency {
                let Some(id) = ready.pop_front() else { break };
                let Some(node) = graph.node(id) else { continue };

                let inputs = TaskInputs::new(
                    node.inputs
                        .iter()
                        .filter_map(|&input| {
                            let name = graph.node(input)?.name.clone();
                            Some((name, outputs[input.index()].clone().unwrap_or_default()))
                        })
                        .collect(),
                );
                let task = std::sync::Arc::clone(&node.task);
                let span = info_span!("task", name = %node.name, dataset = %node.dataset);
                let started = Instant::now();
                let handle = tokio::spawn(async move { task.run(inputs).await }.instrument(span));

                in_flight.push(async move {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(TaskError::Panicked(e.to_string())),
                    };
                    (id, started.elapsed(), result)
                });
            }

            let Some((id, duration, result)) = in_flight.next().await else {
                break;
            };
            let Some(node) = graph.node(id) else { continue };

            match result {
                Ok(output) => {
                    info!(task = %node.name, elapsed_ms = duration.as_millis() as u64, "Task succeeded");
                    outputs[id.index()] = Some(output);
                    records[id.index()] = Some(TaskRecord {
                        name: node.name.clone(),
                        dataset: node.dataset,
                        status: TaskStatus::Succeeded,
                        duration,
                        resources: node.resources.clone(),
                        error: None,
                    });

                    for &dependent in &dependents[id.index()] {
                        remaining[dependent.index()] -= 1;
                        if remaining[dependent.index()] == 0 && records[dependent.index()].is_none() {
                            ready.push_back(dependent);
                        }
                    }
                }
                Err(e) => {
                    error!(task = %node.name, error = %e, "Task failed");
                    records[id.index()] = Some(TaskRecord {
                        name: node.name.clone(),
                        dataset: node.dataset,
                        status: TaskStatus::Failed,
                        duration,
                        resources: Vec::new(),
                        error: Some(e.to_string()),
                    });
                    skip_dependents(&graph, &dependents, id, &mut records);
                }
            }
        }

        let report = RunReport {
            tasks: order.into_iter().filter_map(|id| records[id.index()].take()).collect(),
        };
        info!(
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "Task graph finished"
        );
        Ok(report)
    }
}

/// Mark every transitive dependent of a failed task as skipped
fn skip_dependents(
    graph: &TaskGraph,
    dependents: &[Vec<TaskId>],
    failed: TaskId,
    records: &mut [Option<TaskRecord>],
) {
    let failed_name = graph.node(failed).map(|n| n.name.as_str()).unwrap_or_default();
    let mut queue: VecDeque<TaskId> = dependents[failed.index()].iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        if records[id.index()].is_some() {
            continue;
        }
        let Some(node) = graph.node(id) else { continue };

        warn!(task = %node.name, upstream = %failed_name, "Skipping task after upstream failure");
        records[id.index()] = Some(TaskRecord {
            name: node.name.clone(),
            dataset: node.dataset,
            status: TaskStatus::UpstreamFailed,
            duration: Duration::ZERO,
            resources: Vec::new(),
            error: Some(format!("upstream task '{}' failed", failed_name)),
        });
        queue.extend(dependents[id.index()].iter().copied());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::task::Task;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    struct Probe {
        behavior: Behavior,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                running: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Task for Probe {
        async fn run(&self, _inputs: TaskInputs) -> std::result::Result<TaskOutput, TaskError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            match self.behavior {
                Behavior::Succeed => Ok(TaskOutput::Empty),
                Behavior::Fail => Err(TransformError::MissingUtcOffset { plant_id: 1 }.into()),
                Behavior::Panic => panic!("boom"),
            }
        }
    }

    fn add(graph: &mut TaskGraph, name: &str, behavior: Behavior) -> TaskId {
        graph.add_task(name, Dataset::EpaCems, Arc::new(Probe::new(behavior))).unwrap()
    }

    #[tokio::test]
    async fn test_failure_only_skips_dependents() {
        let mut graph = TaskGraph::new();
        let root = add(&mut graph, "root", Behavior::Succeed);
        let bad = add(&mut graph, "bad", Behavior::Fail);
        let good = add(&mut graph, "good", Behavior::Succeed);
        let behind_bad = add(&mut graph, "behind_bad", Behavior::Succeed);
        let behind_behind = add(&mut graph, "behind_behind", Behavior::Succeed);
        graph.add_input(bad, root).unwrap();
        graph.add_input(good, root).unwrap();
        graph.add_ordering(behind_bad, bad).unwrap();
        graph.add_ordering(behind_behind, behind_bad).unwrap();
        graph.declare_resource(good, "hourly_emissions_epacems_2018_id").unwrap();
        graph.declare_resource(bad, "hourly_emissions_epacems_2018_me").unwrap();

        let report = Scheduler::new(2).run(graph).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.tasks.len(), 5);
        assert_eq!(report.record("good").unwrap().status, TaskStatus::Succeeded);
        assert_eq!(report.record("bad").unwrap().status, TaskStatus::Failed);
        assert_eq!(report.record("behind_bad").unwrap().status, TaskStatus::UpstreamFailed);
        assert_eq!(report.record("behind_behind").unwrap().status, TaskStatus::UpstreamFailed);
        assert_eq!(report.resources_written(), vec!["hourly_emissions_epacems_2018_id".to_string()]);
    }

    #[tokio::test]
    async fn test_panic_is_a_task_failure() {
        let mut graph = TaskGraph::new();
        add(&mut graph, "panics", Behavior::Panic);
        add(&mut graph, "fine", Behavior::Succeed);

        let report = Scheduler::new(4).run(graph).await.unwrap();

        let record = report.record("panics").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("panicked"));
        assert_eq!(report.record("fine").unwrap().status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        for i in 0..12 {
            let probe = Probe {
                behavior: Behavior::Succeed,
                running: Arc::clone(&running),
                peak: Arc::clone(&peak),
            };
            graph.add_task(format!("partition-{i}"), Dataset::EpaCems, Arc::new(probe)).unwrap();
        }

        let report = Scheduler::new(3).run(graph).await.unwrap();

        assert!(report.is_success());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_cyclic_graph_rejected_before_running() {
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "a", Behavior::Succeed);
        let b = add(&mut graph, "b", Behavior::Succeed);
        graph.add_ordering(a, b).unwrap();
        graph.add_ordering(b, a).unwrap();

        assert!(matches!(
            Scheduler::new(1).run(graph).await,
            Err(crate::error::EtlError::GraphCycle(_))
        ));
    }
}
