//! DAG assembly and validation
//!
//! This crate handles:
//! - Building tasks from query files and their metadata
//! - Loading DAG declarations (dags.yaml)
//! - Distributing tasks to their declared DAG
//! - Resolving cross-task dependencies into a cycle-free order
//! - Producing the scheduling plan handed to the DAG renderer

pub mod error;
pub mod task;
pub mod dag;
pub mod collection;
pub mod resolver;
pub mod plan;

pub use error::SchedulingError;
pub use task::{Task, TableRef, QUERY_FILE};
pub use dag::Dag;
pub use collection::DagCollection;
pub use resolver::{DependencyResolver, Dependency, ExternalDependency, Resolution};
pub use plan::{SchedulingPlan, PlanVersion, PlannedDag, PlannedTask, PlannedExternalDependency};
