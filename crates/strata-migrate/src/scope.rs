//! Per-migration atomic scope.
//!
//! DuckDB has no savepoints, so a scope is a top-level transaction on the
//! caller's connection. It commits on [`AtomicScope::commit`] and rolls back
//! when dropped uncommitted, so an early return or panic inside an upgrade
//! body cannot leave the transaction open.

use crate::error::{MigrateError, MigrateResult};
use duckdb::Connection;

/// Guard over `BEGIN TRANSACTION` / `COMMIT` / `ROLLBACK`.
pub struct AtomicScope<'c> {
    conn: &'c Connection,
    finished: bool,
}

impl<'c> AtomicScope<'c> {
    /// Begin a transaction. Fails if one is already open on `conn`.
    pub fn begin(conn: &'c Connection) -> MigrateResult<Self> {
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| MigrateError::TransactionError(format!("BEGIN failed: {e}")))?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Connection the scope runs on.
    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    /// Commit the transaction. On failure the transaction is rolled back.
    pub fn commit(mut self) -> MigrateResult<()> {
        self.finished = true;
        if let Err(commit_err) = self.conn.execute_batch("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(MigrateError::TransactionError(format!(
                "COMMIT failed: {commit_err}"
            )));
        }
        Ok(())
    }

}

impl Drop for AtomicScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            log::warn!("Migrator: rollback of abandoned scope failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        conn
    }

    #[test]
    fn commit_persists() {
        let conn = setup();
        let scope = AtomicScope::begin(&conn).unwrap();
        scope.conn().execute("INSERT INTO t VALUES (1)", []).unwrap();
        scope.commit().unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn drop_rolls_back() {
        let conn = setup();
        {
            let scope = AtomicScope::begin(&conn).unwrap();
            scope.conn().execute("INSERT INTO t VALUES (1)", []).unwrap();
        }
        assert_eq!(count(&conn), 0);
        // Connection is back in auto-commit mode.
        AtomicScope::begin(&conn).unwrap().commit().unwrap();
    }

    #[test]
    fn drop_discards_ddl() {
        let conn = setup();
        {
            let scope = AtomicScope::begin(&conn).unwrap();
            scope
                .conn()
                .execute_batch("ALTER TABLE t ADD COLUMN extra VARCHAR")
                .unwrap();
        }
        let cols: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = 't'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(cols, 1);
    }

    #[test]
    fn nested_begin_fails() {
        let conn = setup();
        let _outer = AtomicScope::begin(&conn).unwrap();
        let err = AtomicScope::begin(&conn).err().unwrap();
        assert!(matches!(err, MigrateError::TransactionError(_)));
    }
}
