//! DAG declarations (dags.yaml) and task distribution
//!
//! ```yaml
//! bqetl_core:
//!   schedule_interval: daily
//!   default_args:
//!     owner: someone@example.org
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::dag::Dag;
use crate::error::SchedulingError;
use crate::task::Task;

/// All declared DAGs, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DagCollection {
    dags: BTreeMap<String, Dag>,
}

/// Declaration of a single DAG
#[derive(Debug, Deserialize)]
struct DagDeclaration {
    schedule_interval: String,

    #[serde(default)]
    default_args: Option<BTreeMap<String, Value>>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl DagCollection {
    /// Load DAG declarations from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, SchedulingError> {
        let name = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SchedulingError::DeclarationParse {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

        Self::from_yaml(&contents).map_err(|e| match e {
            // Errors about a specific DAG already name it
            SchedulingError::DeclarationParse { name: dag, reason } if dag.is_empty() => {
                SchedulingError::DeclarationParse { name, reason }
            }
            other => other,
        })
    }

    /// Parse DAG declarations from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, SchedulingError> {
        let parse_error = |reason: String| SchedulingError::DeclarationParse {
            name: String::new(),
            reason,
        };

        // Going through serde_yaml::Value rejects duplicate DAG names
        let document: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| parse_error(e.to_string()))?;

        match document {
            serde_yaml::Value::Null => Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => {
                let declarations = serde_json::to_value(&document)
                    .map_err(|e| parse_error(e.to_string()))?;
                match declarations {
                    Value::Object(map) => Self::from_mapping(&map),
                    _ => Err(parse_error("expected a mapping of DAG names".to_string())),
                }
            }
            _ => Err(parse_error(
                "expected a mapping of DAG names to DAG declarations".to_string(),
            )),
        }
    }

    /// Build a collection from already parsed declarations
    ///
    /// Either every DAG is valid or nothing is returned.
    pub fn from_mapping(declarations: &Map<String, Value>) -> Result<Self, SchedulingError> {
        let mut dags = BTreeMap::new();

        for (name, value) in declarations {
            let dag = Self::parse_dag(name, value)?;
            dags.insert(name.clone(), dag);
        }

        tracing::debug!(dags = dags.len(), "loaded DAG declarations");

        Ok(Self { dags })
    }

    fn parse_dag(name: &str, value: &Value) -> Result<Dag, SchedulingError> {
        let invalid = |reason: String| SchedulingError::DeclarationParse {
            name: name.to_string(),
            reason,
        };

        if !value.is_object() {
            return Err(invalid(format!(
                "expected a mapping with `schedule_interval`, found {}",
                value_kind(value)
            )));
        }

        let declaration: DagDeclaration =
            serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;

        if declaration.schedule_interval.trim().is_empty() {
            return Err(invalid("`schedule_interval` must not be empty".to_string()));
        }

        let mut dag = Dag::new(
            name,
            declaration.schedule_interval,
            declaration.default_args.unwrap_or_default(),
        )
        .with_tags(declaration.tags.unwrap_or_default());

        if let Some(description) = declaration.description {
            dag = dag.with_description(description);
        }

        Ok(dag)
    }

    /// Look up a DAG by name
    pub fn dag_by_name(&self, name: &str) -> Option<&Dag> {
        self.dags.get(name)
    }

    /// All DAGs in name order
    pub fn dags(&self) -> impl Iterator<Item = &Dag> {
        self.dags.values()
    }

    pub fn len(&self) -> usize {
        self.dags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dags.is_empty()
    }

    /// All tasks, grouped by DAG name, in attachment order within a DAG
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.dags.values().flat_map(|dag| dag.tasks())
    }

    /// Return a copy of this collection with `tasks` added to their DAGs
    ///
    /// Fails on the first task whose DAG is not declared; `self` is never
    /// modified.
    pub fn with_tasks(&self, tasks: &[Task]) -> Result<Self, SchedulingError> {
        let mut dags = self.dags.clone();

        for task in tasks {
            let dag = dags.get_mut(task.dag_name()).ok_or_else(|| {
                SchedulingError::UnresolvedDagReference {
                    task: task.task_name(),
                    dag: task.dag_name().to_string(),
                }
            })?;

            dag.add_task(task.clone())?;
        }

        tracing::debug!(tasks = tasks.len(), "attached tasks to DAGs");

        Ok(Self { dags })
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bqetl_core::{Metadata, Scheduling};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn task(path: &str, dag: &str) -> Task {
        let metadata =
            Metadata::new("test", "test", BTreeMap::new(), Scheduling::new(dag)).unwrap();
        Task::new(path, metadata).unwrap()
    }

    #[test]
    fn dags_from_mapping() {
        let dags = DagCollection::from_mapping(&mapping(json!({
            "test_dag1": {
                "schedule_interval": "daily",
                "default_args": {"owner": "test@example.org"}
            },
            "test_dag2": {"schedule_interval": "daily", "default_args": {}}
        })))
        .unwrap();

        assert_eq!(dags.len(), 2);

        let dag1 = dags.dag_by_name("test_dag1").unwrap();
        assert!(dag1.tasks().is_empty());
        assert_eq!(dag1.schedule_interval(), "daily");
        assert_eq!(
            dag1.default_args(),
            &BTreeMap::from([("owner".to_string(), json!("test@example.org"))])
        );

        let dag2 = dags.dag_by_name("test_dag2").unwrap();
        assert_eq!(dag2.schedule_interval(), "daily");
        assert!(dag2.default_args().is_empty());
    }

    #[test]
    fn default_args_are_optional() {
        let dags = DagCollection::from_mapping(&mapping(json!({
            "no_args": {"schedule_interval": "0 2 * * *"},
            "null_args": {"schedule_interval": "@hourly", "default_args": null}
        })))
        .unwrap();

        assert!(dags.dag_by_name("no_args").unwrap().default_args().is_empty());
        assert!(dags.dag_by_name("null_args").unwrap().default_args().is_empty());
    }

    #[test]
    fn optional_description_and_tags() {
        let dags = DagCollection::from_mapping(&mapping(json!({
            "bqetl_core": {
                "schedule_interval": "daily",
                "description": "Core tables",
                "tags": ["impact/tier_1"]
            }
        })))
        .unwrap();

        let dag = dags.dag_by_name("bqetl_core").unwrap();
        assert_eq!(dag.description(), Some("Core tables"));
        assert_eq!(dag.tags(), ["impact/tier_1".to_string()]);
    }

    #[test]
    fn dags_from_empty_mapping() {
        let dags = DagCollection::from_mapping(&Map::new()).unwrap();
        assert!(dags.is_empty());
        assert!(dags.dag_by_name("anything").is_none());
    }

    #[test]
    fn dags_from_invalid_mapping() {
        let result = DagCollection::from_mapping(&mapping(json!({"foo": "bar"})));
        match result {
            Err(SchedulingError::DeclarationParse { name, .. }) => assert_eq!(name, "foo"),
            other => panic!("expected DeclarationParse, got {:?}", other),
        }
    }

    #[test]
    fn missing_schedule_interval() {
        let result = DagCollection::from_mapping(&mapping(json!({
            "good": {"schedule_interval": "daily"},
            "bad": {"default_args": {}}
        })));
        assert!(matches!(
            result,
            Err(SchedulingError::DeclarationParse { ref name, .. }) if name == "bad"
        ));
    }

    #[test]
    fn non_string_schedule_interval() {
        let result = DagCollection::from_mapping(&mapping(json!({
            "bad": {"schedule_interval": 5}
        })));
        assert!(matches!(result, Err(SchedulingError::DeclarationParse { .. })));
    }

    #[test]
    fn empty_schedule_interval() {
        let result = DagCollection::from_mapping(&mapping(json!({
            "bad": {"schedule_interval": " "}
        })));
        assert!(matches!(result, Err(SchedulingError::DeclarationParse { .. })));
    }

    #[test]
    fn default_args_must_be_mapping() {
        let result = DagCollection::from_mapping(&mapping(json!({
            "bad": {"schedule_interval": "daily", "default_args": ["owner"]}
        })));
        assert!(matches!(result, Err(SchedulingError::DeclarationParse { .. })));
    }

    #[test]
    fn dag_by_name() {
        let dags = DagCollection::from_mapping(&mapping(json!({
            "test_dag1": {"schedule_interval": "daily", "default_args": {}}
        })))
        .unwrap();

        assert_eq!(dags.dag_by_name("test_dag1").unwrap().name(), "test_dag1");
        assert!(dags.dag_by_name("non_existing").is_none());
    }

    #[test]
    fn yaml_top_level_must_be_mapping() {
        let result = DagCollection::from_yaml("- bqetl_core\n- bqetl_events\n");
        assert!(matches!(result, Err(SchedulingError::DeclarationParse { .. })));
    }

    #[test]
    fn yaml_duplicate_dag_names_rejected() {
        let yaml = "bqetl_core:\n  schedule_interval: daily\nbqetl_core:\n  schedule_interval: hourly\n";
        assert!(matches!(
            DagCollection::from_yaml(yaml),
            Err(SchedulingError::DeclarationParse { .. })
        ));
    }

    #[test]
    fn empty_yaml_document() {
        let dags = DagCollection::from_yaml("").unwrap();
        assert!(dags.is_empty());
    }

    #[test]
    fn with_tasks_leaves_receiver_untouched() {
        let base = DagCollection::from_mapping(&mapping(json!({
            "test_dag": {"schedule_interval": "daily"}
        })))
        .unwrap();

        let tasks = vec![task("sql/test/incremental_query_v1/query.sql", "test_dag")];
        let populated = base.with_tasks(&tasks).unwrap();

        assert_eq!(populated.dag_by_name("test_dag").unwrap().tasks().len(), 1);
        assert!(base.dag_by_name("test_dag").unwrap().tasks().is_empty());
    }

    #[test]
    fn with_tasks_unknown_dag() {
        let base = DagCollection::from_mapping(&mapping(json!({
            "test_dag": {"schedule_interval": "daily"}
        })))
        .unwrap();

        let tasks = vec![
            task("sql/test/first_v1/query.sql", "test_dag"),
            task("sql/test/second_v1/query.sql", "non_existing_dag"),
        ];

        match base.with_tasks(&tasks) {
            Err(SchedulingError::UnresolvedDagReference { task, dag }) => {
                assert_eq!(task, "test__second__v1");
                assert_eq!(dag, "non_existing_dag");
            }
            other => panic!("expected UnresolvedDagReference, got {:?}", other),
        }
    }

    #[test]
    fn tasks_iterates_all_dags() {
        let base = DagCollection::from_mapping(&mapping(json!({
            "a_dag": {"schedule_interval": "daily"},
            "b_dag": {"schedule_interval": "daily"}
        })))
        .unwrap();

        let tasks = vec![
            task("sql/test/from_b_v1/query.sql", "b_dag"),
            task("sql/test/from_a_v1/query.sql", "a_dag"),
        ];
        let dags = base.with_tasks(&tasks).unwrap();

        let names: Vec<String> = dags.tasks().map(Task::task_name).collect();
        assert_eq!(names, vec!["test__from_a__v1", "test__from_b__v1"]);
    }
}
