//! Per-query metadata (metadata.yaml)
//!
//! Every scheduled query lives next to a `metadata.yaml` that names the DAG
//! it belongs to and carries its scheduling options. The file is parsed into
//! a loosely shaped intermediate form and then converted into [`Metadata`],
//! which only exists once the required fields have been checked.

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

/// File name of the metadata file that sits next to each query
pub const METADATA_FILE: &str = "metadata.yaml";

/// Label that marks a query as incremental
const INCREMENTAL_LABEL: &str = "incremental";

fn submission_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^submission_date:DATE:(\d{4}-\d{2}-\d{2})$").expect("valid regex")
    })
}

/// Scheduling section of a query's metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduling {
    dag_name: String,
    depends_on_past: bool,
    param: Option<String>,
    referenced_tables: BTreeSet<String>,
}

impl Scheduling {
    /// Create a scheduling section owned by `dag_name`
    pub fn new(dag_name: impl Into<String>) -> Self {
        Self {
            dag_name: dag_name.into(),
            depends_on_past: false,
            param: None,
            referenced_tables: BTreeSet::new(),
        }
    }

    /// Set whether a run waits for the previous run to succeed
    pub fn with_depends_on_past(mut self, depends_on_past: bool) -> Self {
        self.depends_on_past = depends_on_past;
        self
    }

    /// Set the raw query parameter
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// Set the tables this query reads
    pub fn with_referenced_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenced_tables = tables.into_iter().map(Into::into).collect();
        self
    }
}

/// Validated metadata record of a single query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    friendly_name: String,
    description: String,
    labels: BTreeMap<String, String>,
    scheduling: Scheduling,
}

impl Metadata {
    /// Build a metadata record, rejecting an empty DAG name
    pub fn new(
        friendly_name: impl Into<String>,
        description: impl Into<String>,
        labels: BTreeMap<String, String>,
        scheduling: Scheduling,
    ) -> Result<Self, MetadataError> {
        if scheduling.dag_name.trim().is_empty() {
            return Err(MetadataError::Invalid(
                "scheduling.dag_name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            friendly_name: friendly_name.into(),
            description: description.into(),
            labels,
            scheduling,
        })
    }

    /// Load the `metadata.yaml` that sits next to a query file
    pub fn of_query_file(query_file: &Path) -> Result<Self, MetadataError> {
        let path = query_file
            .parent()
            .map(|dir| dir.join(METADATA_FILE))
            .unwrap_or_else(|| Path::new(METADATA_FILE).to_path_buf());

        Self::from_file(&path)
    }

    /// Load metadata from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MetadataError::Io(path.display().to_string(), e.to_string()))?;

        Self::from_yaml(&contents)
    }

    /// Parse metadata from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, MetadataError> {
        let raw: RawMetadata =
            serde_yaml::from_str(yaml).map_err(|e| MetadataError::Parse(e.to_string()))?;

        raw.validate()
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Name of the DAG this query is scheduled in
    pub fn owning_graph_name(&self) -> &str {
        &self.scheduling.dag_name
    }

    pub fn depends_on_past(&self) -> bool {
        self.scheduling.depends_on_past
    }

    /// Raw query parameter, if any
    pub fn param(&self) -> Option<&str> {
        self.scheduling.param.as_deref()
    }

    /// Submission date encoded in the parameter as `submission_date:DATE:YYYY-MM-DD`
    pub fn submission_date(&self) -> Option<NaiveDate> {
        let caps = submission_date_re().captures(self.param()?)?;
        NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
    }

    /// Tables this query reads, as `[project.]dataset.table_version`
    pub fn referenced_tables(&self) -> &BTreeSet<String> {
        &self.scheduling.referenced_tables
    }

    /// Whether the query only processes a single partition per run
    pub fn is_incremental(&self) -> bool {
        self.labels
            .get(INCREMENTAL_LABEL)
            .is_some_and(|value| value != "false")
    }
}

/// metadata.yaml as written by query authors
#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    friendly_name: String,

    #[serde(default)]
    description: String,

    #[serde(default)]
    labels: BTreeMap<String, serde_yaml::Value>,

    #[serde(default)]
    scheduling: Option<RawScheduling>,
}

#[derive(Debug, Deserialize)]
struct RawScheduling {
    #[serde(default)]
    dag_name: Option<String>,

    #[serde(default)]
    depends_on_past: bool,

    #[serde(default)]
    param: Option<String>,

    #[serde(default)]
    referenced_tables: Vec<String>,
}

impl RawMetadata {
    fn validate(self) -> Result<Metadata, MetadataError> {
        let scheduling = self.scheduling.ok_or(MetadataError::Unscheduled)?;

        let dag_name = scheduling.dag_name.ok_or_else(|| {
            MetadataError::Invalid("scheduling.dag_name is required".to_string())
        })?;

        let labels = self
            .labels
            .into_iter()
            .map(|(key, value)| label_value(&key, value).map(|value| (key, value)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut record = Scheduling::new(dag_name)
            .with_depends_on_past(scheduling.depends_on_past)
            .with_referenced_tables(scheduling.referenced_tables);
        record.param = scheduling.param;

        Metadata::new(self.friendly_name, self.description, labels, record)
    }
}

/// Labels are flat key/value pairs; scalars are normalized to strings
fn label_value(key: &str, value: serde_yaml::Value) -> Result<String, MetadataError> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s),
        _ => Err(MetadataError::Invalid(format!(
            "label '{}' must be a scalar value",
            key
        ))),
    }
}

/// Metadata parsing errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read metadata file {0}: {1}")]
    Io(String, String),

    #[error("Failed to parse metadata YAML: {0}")]
    Parse(String),

    #[error("Invalid metadata: {0}")]
    Invalid(String),

    #[error("Query has no scheduling metadata")]
    Unscheduled,
}
