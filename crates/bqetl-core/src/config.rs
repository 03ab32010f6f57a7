//! Configuration schema (bqetl.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do with a query file whose path does not follow the
/// `<dataset>/<table>_<version>/query.sql` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingPolicy {
    /// Fail the whole run
    Abort,

    /// Log a warning and leave the query unscheduled
    Skip,
}

impl Default for AddressingPolicy {
    fn default() -> Self {
        Self::Abort
    }
}

fn default_dags_file() -> PathBuf {
    PathBuf::from("dags.yaml")
}

fn default_sql_dir() -> PathBuf {
    PathBuf::from("sql")
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// DAG declaration file
    #[serde(default = "default_dags_file")]
    pub dags_file: PathBuf,

    /// Root of the `<dataset>/<table>_<version>/query.sql` tree
    #[serde(default = "default_sql_dir")]
    pub sql_dir: PathBuf,

    /// Handling of badly located query files
    #[serde(default)]
    pub on_addressing_error: AddressingPolicy,

    /// Tasks excluded from scheduling (glob patterns over `dataset.table_version`)
    #[serde(default)]
    pub skip_tasks: Vec<String>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dags_file: default_dags_file(),
            sql_dir: default_sql_dir(),
            on_addressing_error: AddressingPolicy::default(),
            skip_tasks: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.display().to_string(), e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        Ok(config)
    }

    /// DAG declaration file, resolved against the project root
    pub fn dags_path(&self) -> PathBuf {
        self.resolve(&self.dags_file)
    }

    /// Query tree root, resolved against the project root
    pub fn sql_path(&self) -> PathBuf {
        self.resolve(&self.sql_dir)
    }

    /// Check if a task (`dataset.table_version`) is excluded from scheduling
    pub fn is_task_skipped(&self, task: &str) -> bool {
        self.skip_tasks.iter().any(|pattern| glob_match(pattern, task))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Simple glob matching (supports a single `*` wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(String, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.dags_file, PathBuf::from("dags.yaml"));
        assert_eq!(config.sql_dir, PathBuf::from("sql"));
        assert_eq!(config.on_addressing_error, AddressingPolicy::Abort);
        assert!(config.skip_tasks.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml(
            r#"
            dags_file = "conf/dags.yaml"
            sql_dir = "queries"
            on_addressing_error = "skip"
            skip_tasks = ["telemetry_derived.*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.dags_file, PathBuf::from("conf/dags.yaml"));
        assert_eq!(config.sql_dir, PathBuf::from("queries"));
        assert_eq!(config.on_addressing_error, AddressingPolicy::Skip);
        assert!(config.is_task_skipped("telemetry_derived.clients_daily_v6"));
        assert!(!config.is_task_skipped("search_derived.search_clients_daily_v8"));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = Config::from_toml(r#"on_addressing_error = "ignore""#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn paths_resolve_against_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bqetl.toml");
        std::fs::write(&path, "sql_dir = \"queries\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.sql_path(), dir.path().join("queries"));
        assert_eq!(config.dags_path(), dir.path().join("dags.yaml"));
    }

    #[test]
    fn missing_config_file() {
        let result = Config::from_file(Path::new("does/not/exist/bqetl.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_, _))));
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("staging.*", "staging.users_v1"));
        assert!(glob_match("*_v1", "staging.users_v1"));
        assert!(!glob_match("staging.*", "prod.users_v1"));
        assert!(!glob_match("ab*ba", "aba"));
    }
}
