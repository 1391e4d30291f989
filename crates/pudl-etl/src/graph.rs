//! Task graph
//!
//! A plain directed graph of task descriptors. Edges come in two kinds:
//! data inputs, whose outputs are handed to the task, and ordering edges,
//! which only delay it. Both must succeed before the task runs.

use crate::error::{EtlError, Result};
use crate::pipeline::Dataset;
use crate::task::Task;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct TaskNode {
    pub name: String,
    pub dataset: Dataset,
    pub task: Arc<dyn Task>,
    pub inputs: Vec<TaskId>,
    pub after: Vec<TaskId>,
    /// Resources this task writes when it succeeds
    pub resources: Vec<String>,
}

impl TaskNode {
    /// Every task that must succeed before this one runs
    pub fn upstream(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.inputs.iter().chain(self.after.iter()).copied()
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("dataset", &self.dataset)
            .field("inputs", &self.inputs)
            .field("after", &self.after)
            .field("resources", &self.resources)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    by_name: HashMap<String, TaskId>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, name: impl Into<String>, dataset: Dataset, task: Arc<dyn Task>) -> Result<TaskId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(EtlError::DuplicateTask(name));
        }

        let id = TaskId(self.nodes.len());
        self.by_name.insert(name.clone(), id);
        self.nodes.push(TaskNode {
            name,
            dataset,
            task,
            inputs: Vec::new(),
            after: Vec::new(),
            resources: Vec::new(),
        });
        Ok(id)
    }

    /// Hand the output of `input` to `task`
    pub fn add_input(&mut self, task: TaskId, input: TaskId) -> Result<()> {
        self.check(input)?;
        let node = self.node_mut(task)?;
        if !node.inputs.contains(&input) {
            node.inputs.push(input);
        }
        Ok(())
    }

    /// Run `task` only after `upstream` succeeded
    pub fn add_ordering(&mut self, task: TaskId, upstream: TaskId) -> Result<()> {
        self.check(upstream)?;
        let node = self.node_mut(task)?;
        if !node.after.contains(&upstream) && !node.inputs.contains(&upstream) {
            node.after.push(upstream);
        }
        Ok(())
    }

    pub fn declare_resource(&mut self, task: TaskId, resource_name: impl Into<String>) -> Result<()> {
        self.node_mut(task)?.resources.push(resource_name.into());
        Ok(())
    }

    pub fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.nodes.len()).map(TaskId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (TaskId, &TaskNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (TaskId(i), node))
    }

    /// Downstream adjacency, indexed by task id
    pub fn dependents(&self) -> Vec<Vec<TaskId>> {
        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (id, node) in self.nodes() {
            for upstream in node.upstream() {
                dependents[upstream.0].push(id);
            }
        }
        dependents
    }

    /// Kahn's algorithm; tasks left over sit on or behind a cycle
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let dependents = self.dependents();
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.upstream().count()).collect();
        let mut queue: VecDeque<TaskId> = self.ids().filter(|id| in_degree[id.0] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &dependent in &dependents[id.0] {
                in_degree[dependent.0] -= 1;
                if in_degree[dependent.0] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = self
                .nodes()
                .filter(|(id, _)| in_degree[id.0] > 0)
                .map(|(_, node)| node.name.clone())
                .collect();
            return Err(EtlError::GraphCycle(stuck));
        }

        Ok(order)
    }

    fn check(&self, id: TaskId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(EtlError::UnknownTask(id.0))
        }
    }

    fn node_mut(&mut self, id: TaskId) -> Result<&mut TaskNode> {
        self.nodes.get_mut(id.0).ok_or(EtlError::UnknownTask(id.0))
    }
}
