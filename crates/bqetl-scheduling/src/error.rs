//! Scheduling error types
//!
//! Every variant describes a static defect in the DAG declarations or in a
//! query's metadata. None of them are transient.

use bqetl_core::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid query file location {location}: expected <dataset>/<table>_<version>/query.sql")]
    Addressing { location: String },

    #[error("Invalid DAG declaration '{name}': {reason}")]
    DeclarationParse { name: String, reason: String },

    #[error("Task {task} belongs to DAG '{expected}' and cannot be added to DAG '{dag}'")]
    InvalidDagReference {
        task: String,
        dag: String,
        expected: String,
    },

    #[error("Task {task} references DAG '{dag}' which is not declared")]
    UnresolvedDagReference { task: String, dag: String },

    #[error("Cyclic dependency between tasks: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Task {task} is declared more than once")]
    DuplicateTask { task: String },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
