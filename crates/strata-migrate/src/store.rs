//! Target store connection wrapper.
//!
//! [`Store`] owns a DuckDB [`Connection`] and provides helpers for opening
//! the database and migrating it with a [`Migrator`].

use crate::config::{DatabaseConfig, MEMORY_PATH};
use crate::error::{MigrateError, MigrateResult};
use crate::runner::{Migrator, RunReport};
use duckdb::Connection;
use std::path::Path;

/// Wrapper around a DuckDB connection to the target store.
///
/// Single-threaded: a migration run is sequential. Use
/// [`Store::connect`] to get an independent connection for another thread.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path`. Does not migrate.
    pub fn open(path: &Path) -> MigrateResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| MigrateError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self { conn })
    }

    /// Create an empty in-memory database.
    pub fn open_memory() -> MigrateResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MigrateError::ConnectionError(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open the store described by `config` (handles `:memory:`).
    pub fn from_config(config: &DatabaseConfig) -> MigrateResult<Self> {
        if config.path == MEMORY_PATH {
            Self::open_memory()
        } else {
            Self::open(Path::new(&config.path))
        }
    }

    /// Borrow the underlying DuckDB connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open another connection to the same database.
    pub fn connect(&self) -> MigrateResult<Connection> {
        self.conn
            .try_clone()
            .map_err(|e| MigrateError::ConnectionError(format!("failed to clone connection: {e}")))
    }

    /// Apply pending migrations from `migrator`.
    pub fn migrate(&self, migrator: &Migrator<'_>) -> MigrateResult<RunReport> {
        migrator.run(&self.conn)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
