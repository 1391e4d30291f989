//! Units of scheduled work

use crate::epacems::PlantUtcOffsets;
use crate::error::TaskError;
use async_trait::async_trait;
use std::sync::Arc;

/// Value a task hands to the tasks that take it as input
#[derive(Debug, Clone, Default)]
pub enum TaskOutput {
    #[default]
    Empty,
    /// Broadcast to every CEMS partition task
    PlantUtcOffsets(Arc<PlantUtcOffsets>),
}

/// Outputs of a task's data inputs, keyed by producing task name
#[derive(Debug, Clone, Default)]
pub struct TaskInputs {
    outputs: Vec<(String, TaskOutput)>,
}

impl TaskInputs {
    pub fn new(outputs: Vec<(String, TaskOutput)>) -> Self {
        Self { outputs }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, task_name: &str) -> Option<&TaskOutput> {
        self.outputs
            .iter()
            .find(|(name, _)| name == task_name)
            .map(|(_, output)| output)
    }

    pub fn plant_utc_offsets(&self) -> Result<Arc<PlantUtcOffsets>, TaskError> {
        self.outputs
            .iter()
            .find_map(|(_, output)| match output {
                TaskOutput::PlantUtcOffsets(offsets) => Some(Arc::clone(offsets)),
                TaskOutput::Empty => None,
            })
            .ok_or_else(|| TaskError::MissingInput("plant UTC offsets".to_string()))
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, inputs: TaskInputs) -> Result<TaskOutput, TaskError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_shared() {
        let offsets = Arc::new(PlantUtcOffsets::default());
        let inputs = TaskInputs::new(vec![(
            "epacems:plant_utc_offset".to_string(),
            TaskOutput::PlantUtcOffsets(Arc::clone(&offsets)),
        )]);

        let received = inputs.plant_utc_offsets().unwrap();
        assert!(Arc::ptr_eq(&offsets, &received));
        assert!(inputs.get("epacems:plant_utc_offset").is_some());
    }

    #[test]
    fn test_missing_offsets() {
        let inputs = TaskInputs::default();
        assert!(matches!(inputs.plant_utc_offsets(), Err(TaskError::MissingInput(_))));
    }
}
