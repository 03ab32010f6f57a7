//! Scheduled tasks
//!
//! A task is one query file plus its metadata. The query's location in the
//! SQL tree determines which table it produces.

use bqetl_core::Metadata;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::SchedulingError;

/// File name of a scheduled query
pub const QUERY_FILE: &str = "query.sql";

fn query_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^.*/([a-zA-Z0-9_]+)/([a-zA-Z0-9_]+)_(v[0-9]+)/query\.sql$")
            .expect("valid regex")
    })
}

fn table_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[a-zA-Z0-9_-]+\.)?([a-zA-Z0-9_]+)\.([a-zA-Z0-9_]+)_(v[0-9]+)$")
            .expect("valid regex")
    })
}

/// Versioned destination table of a query
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
    pub version: String,
}

impl TableRef {
    pub fn new(
        dataset: impl Into<String>,
        table: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
            version: version.into(),
        }
    }

    /// Parse a `[project.]dataset.table_version` location
    ///
    /// Backtick quoting is accepted, either around the whole location or
    /// around each part. Returns `None` for anything that does not name a
    /// versioned table, e.g. unversioned views or wildcard tables.
    pub fn parse(location: &str) -> Option<Self> {
        let unquoted = location.trim().replace('`', "");
        let caps = table_location_re().captures(&unquoted)?;
        Some(Self::new(&caps[1], &caps[2], &caps[3]))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}_{}", self.dataset, self.table, self.version)
    }
}

/// A query scheduled in a DAG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    query_file: PathBuf,
    metadata: Metadata,
    destination: TableRef,
}

impl Task {
    /// Create a task for `query_file`, which must be located at
    /// `.../<dataset>/<table>_<version>/query.sql`
    pub fn new(query_file: impl Into<PathBuf>, metadata: Metadata) -> Result<Self, SchedulingError> {
        let query_file = query_file.into();
        let location = query_file.to_string_lossy().replace('\\', "/");

        let caps = query_file_re()
            .captures(&location)
            .ok_or_else(|| SchedulingError::Addressing {
                location: location.clone(),
            })?;
        let destination = TableRef::new(&caps[1], &caps[2], &caps[3]);

        Ok(Self {
            query_file,
            metadata,
            destination,
        })
    }

    /// Create a task from a query file and the metadata.yaml next to it
    pub fn of_query(query_file: &Path) -> Result<Self, SchedulingError> {
        let metadata = Metadata::of_query_file(query_file)?;
        Self::new(query_file, metadata)
    }

    pub fn query_file(&self) -> &Path {
        &self.query_file
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn dataset(&self) -> &str {
        &self.destination.dataset
    }

    pub fn table(&self) -> &str {
        &self.destination.table
    }

    pub fn version(&self) -> &str {
        &self.destination.version
    }

    /// Name of the DAG this task is scheduled in
    pub fn dag_name(&self) -> &str {
        self.metadata.owning_graph_name()
    }

    /// Table written by this task
    pub fn table_ref(&self) -> &TableRef {
        &self.destination
    }

    /// Task identifier handed to the renderer (`dataset__table__version`)
    pub fn task_name(&self) -> String {
        format!("{}__{}__{}", self.dataset(), self.table(), self.version())
    }

    /// Ordering key used to break ties between unrelated tasks
    pub fn sort_key(&self) -> (&str, &str, &str, &str) {
        (self.dag_name(), self.dataset(), self.table(), self.version())
    }
}
