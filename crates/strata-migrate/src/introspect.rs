//! Read-only schema introspection used to guard upgrade statements.

use crate::error::{MigrateError, MigrateResult};
use crate::sql_utils::split_qualified_name;
use duckdb::Connection;
use std::collections::BTreeSet;

/// One column of an introspected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Read-only view of the store's current schema.
///
/// Table names may be schema-qualified (`schema.table`); unqualified names
/// resolve to `main`.
pub trait SchemaIntrospector {
    /// Does the table (or view) exist?
    fn table_exists(&self, table: &str) -> MigrateResult<bool>;

    /// Columns of `table` in ordinal order; empty when the table is absent.
    fn columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>>;

    /// Does `table` carry an index named `index`?
    fn has_index(&self, table: &str, index: &str) -> MigrateResult<bool>;

    fn column_names(&self, table: &str) -> MigrateResult<BTreeSet<String>> {
        Ok(self.columns(table)?.into_iter().map(|c| c.name).collect())
    }

    fn has_column(&self, table: &str, column: &str) -> MigrateResult<bool> {
        Ok(self.columns(table)?.iter().any(|c| c.name == column))
    }
}

/// [`SchemaIntrospector`] over a borrowed DuckDB connection.
///
/// Queries run on the caller's connection, so they observe any uncommitted
/// DDL of the transaction in progress.
pub struct DuckDbIntrospector<'c> {
    conn: &'c Connection,
}

impl<'c> DuckDbIntrospector<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl SchemaIntrospector for DuckDbIntrospector<'_> {
    fn table_exists(&self, table: &str) -> MigrateResult<bool> {
        let (schema, name) = split_qualified_name(table);
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                duckdb::params![schema, name],
                |row| row.get(0),
            )
            .map_err(|e| {
                MigrateError::QueryError(format!("table lookup for {table} failed: {e}"))
            })?;
        Ok(count > 0)
    }

    fn columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        let (schema, name) = split_qualified_name(table);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name, data_type, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .map_err(|e| MigrateError::QueryError(format!("column lookup prepare failed: {e}")))?;
        let rows = stmt
            .query_map(duckdb::params![schema, name], |row| {
                let nullable: String = row.get(2)?;
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: nullable.eq_ignore_ascii_case("YES"),
                })
            })
            .map_err(|e| MigrateError::QueryError(format!("column lookup for {table} failed: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::QueryError(format!("column row error: {e}")))?;
        Ok(rows)
    }

    fn has_index(&self, table: &str, index: &str) -> MigrateResult<bool> {
        let (schema, name) = split_qualified_name(table);
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM duckdb_indexes() \
                 WHERE schema_name = ? AND table_name = ? AND index_name = ?",
                duckdb::params![schema, name, index],
                |row| row.get(0),
            )
            .map_err(|e| {
                MigrateError::QueryError(format!("index lookup for {table}.{index} failed: {e}"))
            })?;
        Ok(count > 0)
    }
}

#[cfg(test)]
#[path = "introspect_test.rs"]
mod tests;
