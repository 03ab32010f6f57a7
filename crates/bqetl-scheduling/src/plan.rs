//! Scheduling plan (stable v1)
//!
//! The plan is what the DAG renderer consumes. This schema is VERSIONED;
//! breaking changes require a new major version.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::collection::DagCollection;
use crate::resolver::Resolution;
use crate::task::Task;

/// Plan schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl PlanVersion {
    /// Current plan schema version
    pub const CURRENT: PlanVersion = PlanVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for PlanVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A task as handed to the renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Unique task id (`dataset__table__version`)
    pub task_name: String,

    pub dataset: String,
    pub table: String,
    pub version: String,

    /// Query file path as given at construction
    pub query_file: String,

    pub depends_on_past: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<NaiveDate>,

    pub is_incremental: bool,

    /// Task names this task waits for, possibly in other DAGs
    pub upstream: Vec<String>,
}

/// A DAG with its tasks in dependency order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedDag {
    pub name: String,
    pub schedule_interval: String,
    pub default_args: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub tasks: Vec<PlannedTask>,
}

/// A table read by a task but produced outside of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedExternalDependency {
    pub task_name: String,
    pub location: String,
}

/// Validated output of the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingPlan {
    /// Schema version
    pub version: PlanVersion,

    /// DAGs in name order
    pub dags: Vec<PlannedDag>,

    /// Global task order across all DAGs
    pub order: Vec<String>,

    pub external_dependencies: Vec<PlannedExternalDependency>,
}

impl SchedulingPlan {
    /// Build the plan for a resolved collection
    ///
    /// `resolution` must come from resolving `collection`.
    pub fn build(collection: &DagCollection, resolution: &Resolution<'_>) -> Self {
        let order = resolution.order();
        let position: HashMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(idx, task)| (task.task_name(), idx))
            .collect();

        let dags = collection
            .dags()
            .map(|dag| {
                let mut tasks: Vec<&Task> = dag.tasks().iter().collect();
                tasks.sort_by_key(|task| position.get(&task.task_name()).copied());

                PlannedDag {
                    name: dag.name().to_string(),
                    schedule_interval: dag.schedule_interval().to_string(),
                    default_args: dag.default_args().clone(),
                    description: dag.description().map(str::to_string),
                    tags: dag.tags().to_vec(),
                    tasks: tasks
                        .into_iter()
                        .map(|task| Self::planned_task(task, resolution))
                        .collect(),
                }
            })
            .collect();

        let external_dependencies = resolution
            .external_dependencies()
            .iter()
            .map(|dep| PlannedExternalDependency {
                task_name: dep.task.task_name(),
                location: dep.location.clone(),
            })
            .collect();

        Self {
            version: PlanVersion::CURRENT,
            dags,
            order: order.iter().map(|task| task.task_name()).collect(),
            external_dependencies,
        }
    }

    fn planned_task(task: &Task, resolution: &Resolution<'_>) -> PlannedTask {
        let task_name = task.task_name();
        let metadata = task.metadata();

        PlannedTask {
            upstream: resolution
                .upstream(&task_name)
                .iter()
                .map(|upstream| upstream.task_name())
                .collect(),
            task_name,
            dataset: task.dataset().to_string(),
            table: task.table().to_string(),
            version: task.version().to_string(),
            query_file: task.query_file().display().to_string(),
            depends_on_past: metadata.depends_on_past(),
            param: metadata.param().map(str::to_string),
            submission_date: metadata.submission_date(),
            is_incremental: metadata.is_incremental(),
        }
    }

    /// Total number of tasks across all DAGs
    pub fn task_count(&self) -> usize {
        self.order.len()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
