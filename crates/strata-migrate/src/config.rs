//! Configuration types and parsing for strata.yml

use crate::error::{MigrateError, MigrateResult};
use crate::history::{HistoryStore, DEFAULT_HISTORY_TABLE};
use crate::sql_utils::{validate_ident, DEFAULT_SCHEMA};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Special database path for an in-memory store.
pub const MEMORY_PATH: &str = ":memory:";

/// File names searched by [`StrataConfig::load_from_dir`], in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["strata.yml", "strata.yaml"];

/// Top-level configuration from strata.yml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Target store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Bookkeeping table location
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Target store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// DuckDB file path, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Bookkeeping table settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    #[serde(default = "default_history_schema")]
    pub schema: String,

    #[serde(default = "default_history_table")]
    pub table: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            schema: default_history_schema(),
            table: default_history_table(),
        }
    }
}

fn default_db_path() -> String {
    MEMORY_PATH.to_string()
}

fn default_history_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_history_table() -> String {
    DEFAULT_HISTORY_TABLE.to_string()
}

impl StrataConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> MigrateResult<Self> {
        if !path.exists() {
            return Err(MigrateError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MigrateError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: StrataConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory containing strata.yml or strata.yaml
    pub fn load_from_dir(dir: &Path) -> MigrateResult<Self> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
            .map_or_else(
                || {
                    Err(MigrateError::ConfigNotFound {
                        path: dir.join(CONFIG_FILE_NAMES[0]).display().to_string(),
                    })
                },
                |path| Self::load(&path),
            )
    }

    /// Validate the configuration
    pub fn validate(&self) -> MigrateResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(MigrateError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }
        for (field, value) in [
            ("history.schema", &self.history.schema),
            ("history.table", &self.history.table),
        ] {
            validate_ident(value).map_err(|_| MigrateError::ConfigInvalid {
                message: format!(
                    "{field} must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*), got '{value}'"
                ),
            })?;
        }
        Ok(())
    }

    /// Override the database path (CLI flag or environment).
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database.path = path.into();
        self
    }

    /// History store described by this configuration.
    pub fn history_store(&self) -> MigrateResult<HistoryStore> {
        HistoryStore::new(&self.history.schema, &self.history.table)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.path == MEMORY_PATH
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
