//! Query discovery
//!
//! Walks the SQL tree and turns every scheduled `query.sql` into a task.

use anyhow::{anyhow, Result};
use bqetl_core::{AddressingPolicy, Config, Metadata, MetadataError, METADATA_FILE};
use bqetl_scheduling::{SchedulingError, Task, QUERY_FILE};
use walkdir::WalkDir;

/// Find all scheduled queries below the configured SQL directory
///
/// Queries without a metadata file or without a scheduling section are not
/// scheduled. Files are visited in name order so the task list is stable.
pub fn discover_tasks(config: &Config) -> Result<Vec<Task>> {
    let root = config.sql_path();
    if !root.is_dir() {
        return Err(anyhow!("SQL directory not found at {}", root.display()));
    }

    let mut tasks = Vec::new();

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != QUERY_FILE {
            continue;
        }

        let path = entry.path();
        if !path.with_file_name(METADATA_FILE).is_file() {
            tracing::debug!(query = %path.display(), "no metadata, not scheduled");
            continue;
        }

        let metadata = match Metadata::of_query_file(path) {
            Ok(metadata) => metadata,
            Err(MetadataError::Unscheduled) => {
                tracing::debug!(query = %path.display(), "no scheduling section");
                continue;
            }
            Err(e) => return Err(anyhow!("{}: {}", path.display(), e)),
        };

        let task = match Task::new(path, metadata) {
            Ok(task) => task,
            Err(e @ SchedulingError::Addressing { .. }) => match config.on_addressing_error {
                AddressingPolicy::Abort => return Err(e.into()),
                AddressingPolicy::Skip => {
                    tracing::warn!("skipping query: {}", e);
                    continue;
                }
            },
            Err(e) => return Err(e.into()),
        };

        if config.is_task_skipped(&task.table_ref().to_string()) {
            tracing::info!(task = %task.task_name(), "skipped by configuration");
            continue;
        }

        tasks.push(task);
    }

    tracing::debug!(tasks = tasks.len(), root = %root.display(), "discovered scheduled queries");

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_query(root: &Path, dir: &str, metadata: Option<&str>) {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(QUERY_FILE), "SELECT 1").unwrap();
        if let Some(metadata) = metadata {
            std::fs::write(dir.join(METADATA_FILE), metadata).unwrap();
        }
    }

    fn config(root: &Path) -> Config {
        Config {
            sql_dir: root.to_path_buf(),
            ..Config::default()
        }
    }

    const SCHEDULED: &str = "scheduling:\n  dag_name: bqetl_core\n";

    #[test]
    fn finds_scheduled_queries_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "telemetry/zeta_v1", Some(SCHEDULED));
        write_query(dir.path(), "telemetry/alpha_v2", Some(SCHEDULED));
        write_query(dir.path(), "telemetry/no_metadata_v1", None);
        write_query(dir.path(), "telemetry/manual_v1", Some("friendly_name: Manual\n"));

        let tasks = discover_tasks(&config(dir.path())).unwrap();
        let names: Vec<String> = tasks.iter().map(Task::task_name).collect();
        assert_eq!(names, vec!["telemetry__alpha__v2", "telemetry__zeta__v1"]);
    }

    #[test]
    fn badly_located_query_aborts_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "telemetry/unversioned", Some(SCHEDULED));

        let result = discover_tasks(&config(dir.path()));
        assert!(result.is_err());
    }

    #[test]
    fn badly_located_query_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "telemetry/unversioned", Some(SCHEDULED));
        write_query(dir.path(), "telemetry/clients_v1", Some(SCHEDULED));

        let config = Config {
            on_addressing_error: AddressingPolicy::Skip,
            ..config(dir.path())
        };
        let tasks = discover_tasks(&config).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].table(), "clients");
    }

    #[test]
    fn skip_patterns_exclude_tasks() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "telemetry/clients_v1", Some(SCHEDULED));
        write_query(dir.path(), "search/clients_v1", Some(SCHEDULED));

        let config = Config {
            skip_tasks: vec!["search.*".to_string()],
            ..config(dir.path())
        };
        let tasks = discover_tasks(&config).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].dataset(), "telemetry");
    }

    #[test]
    fn invalid_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "telemetry/clients_v1", Some("scheduling:\n  depends_on_past: true\n"));

        assert!(discover_tasks(&config(dir.path())).is_err());
    }

    #[test]
    fn missing_sql_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_tasks(&config(&dir.path().join("missing"))).is_err());
    }
}
