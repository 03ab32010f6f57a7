//! A single scheduling DAG

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::SchedulingError;
use crate::task::Task;

/// One declared DAG: a schedule, default task arguments and its tasks
#[derive(Debug, Clone, PartialEq)]
pub struct Dag {
    name: String,
    schedule_interval: String,
    default_args: BTreeMap<String, Value>,
    description: Option<String>,
    tags: Vec<String>,
    tasks: Vec<Task>,
}

impl Dag {
    /// Create an empty DAG
    ///
    /// The schedule interval is opaque here; it is passed to the renderer
    /// exactly as declared.
    pub fn new(
        name: impl Into<String>,
        schedule_interval: impl Into<String>,
        default_args: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule_interval: schedule_interval.into(),
            default_args,
            description: None,
            tags: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule_interval(&self) -> &str {
        &self.schedule_interval
    }

    pub fn default_args(&self) -> &BTreeMap<String, Value> {
        &self.default_args
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Tasks in the order they were added
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Add a task that declares this DAG as its owner
    pub fn add_task(&mut self, task: Task) -> Result<(), SchedulingError> {
        if task.dag_name() != self.name {
            return Err(SchedulingError::InvalidDagReference {
                task: task.task_name(),
                dag: self.name.clone(),
                expected: task.dag_name().to_string(),
            });
        }

        self.tasks.push(task);
        Ok(())
    }
}
