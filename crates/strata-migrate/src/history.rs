//! Bookkeeping table recording which migrations have completed.
//!
//! One row per applied migration id, written inside the same transaction as
//! the migration itself. Rows are never updated or deleted by the engine.

use crate::error::{MigrateError, MigrateResult};
use crate::introspect::{DuckDbIntrospector, SchemaIntrospector};
use crate::sql_utils::{quote_ident, TableRef, DEFAULT_SCHEMA};
use chrono::{DateTime, Utc};
use duckdb::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Default bookkeeping table name.
pub const DEFAULT_HISTORY_TABLE: &str = "schema_migrations";

const ENSURE_ATTEMPTS: u32 = 5;
const ENSURE_BACKOFF: Duration = Duration::from_millis(20);

/// A completed migration as stored in the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub id: String,
    pub applied_at: DateTime<Utc>,
}

/// Handle on the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStore {
    table: TableRef,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self {
            table: TableRef {
                schema: DEFAULT_SCHEMA.to_string(),
                table: DEFAULT_HISTORY_TABLE.to_string(),
            },
        }
    }
}

impl HistoryStore {
    /// Use `schema.table` instead of the default `main.schema_migrations`.
    pub fn new(schema: &str, table: &str) -> MigrateResult<Self> {
        Ok(Self {
            table: TableRef::new(schema, table)?,
        })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Create the schema and table if absent.
    ///
    /// Another process may create the same objects concurrently. DuckDB
    /// reports that as a conflict before the other transaction commits, so a
    /// failed attempt waits briefly and tries again; once the table is
    /// visible the store is usable regardless of who created it.
    pub fn ensure_exists(&self, conn: &Connection) -> MigrateResult<()> {
        let mut ddl = String::new();
        if !self.table.is_default_schema() {
            ddl.push_str(&format!(
                "CREATE SCHEMA IF NOT EXISTS {};\n",
                quote_ident(&self.table.schema)
            ));
        }
        ddl.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 id         VARCHAR PRIMARY KEY,
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
             );",
            self.table.quoted()
        ));

        let mut attempt = 1;
        loop {
            let err = match conn.execute_batch(&ddl) {
                Ok(()) => {
                    log::debug!("Migrator: history table {} ready", self.table);
                    return Ok(());
                }
                Err(e) => e,
            };
            if let Ok(true) = self.exists(conn) {
                log::debug!(
                    "Migrator: history table {} created concurrently ({err})",
                    self.table
                );
                return Ok(());
            }
            if attempt >= ENSURE_ATTEMPTS {
                return Err(MigrateError::StoreUnavailable(format!(
                    "failed to create {}: {err}",
                    self.table
                )));
            }
            log::debug!(
                "Migrator: creating {} failed (attempt {attempt}/{ENSURE_ATTEMPTS}): {err}",
                self.table
            );
            std::thread::sleep(ENSURE_BACKOFF * attempt);
            attempt += 1;
        }
    }

    /// Whether the bookkeeping table exists. Never creates it.
    pub fn exists(&self, conn: &Connection) -> MigrateResult<bool> {
        DuckDbIntrospector::new(conn).table_exists(&self.table.to_string())
    }

    /// Ids of every recorded migration, read in a single statement.
    pub fn load_applied(&self, conn: &Connection) -> MigrateResult<HashSet<String>> {
        let sql = format!("SELECT id FROM {}", self.table.quoted());
        let mut stmt = conn.prepare(&sql).map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to read {}: {e}", self.table))
        })?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to read {}: {e}", self.table))
            })?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| MigrateError::StoreUnavailable(format!("history row error: {e}")))?;
        Ok(ids)
    }

    /// All records ordered by application time, then id.
    pub fn records(&self, conn: &Connection) -> MigrateResult<Vec<HistoryRecord>> {
        let sql = format!(
            "SELECT id, epoch_us(applied_at) FROM {} ORDER BY applied_at, id",
            self.table.quoted()
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to read {}: {e}", self.table))
        })?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to read {}: {e}", self.table))
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::StoreUnavailable(format!("history row error: {e}")))?;

        raw.into_iter()
            .map(|(id, micros)| {
                let applied_at = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                    MigrateError::QueryError(format!(
                        "applied_at out of range for {id}: {micros}"
                    ))
                })?;
                Ok(HistoryRecord { id, applied_at })
            })
            .collect()
    }

    /// Insert exactly one row for `id`.
    ///
    /// The primary key rejects a second row for the same id, which is how a
    /// losing concurrent run finds out it lost.
    pub fn record(&self, conn: &Connection, id: &str) -> MigrateResult<()> {
        let sql = format!("INSERT INTO {} (id) VALUES (?)", self.table.quoted());
        conn.execute(&sql, duckdb::params![id])
            .map_err(|e| MigrateError::QueryError(format!("failed to record {id}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
