//! Integration tests for migrating on-disk stores.
//!
//! These use the public API only: reopening a file between runs stands in for
//! a process restart, and cloned connections on separate threads stand in for
//! replicas starting at the same time.

use duckdb::Connection;
use strata_migrate::{
    catalog, HistoryStore, MigrateError, MigrateResult, Migration, Migrator, Registry,
    SchemaIntrospector, Store,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0)).unwrap()
}

fn create_users(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE users (user_id BIGINT NOT NULL, username VARCHAR);
         INSERT INTO users SELECT range, 'user_' || CAST(range AS VARCHAR) FROM range(50);",
    )
    .unwrap();
}

fn add_orders_table(conn: &Connection, schema: &dyn SchemaIntrospector) -> MigrateResult<()> {
    if !schema.table_exists("orders")? {
        conn.execute_batch("CREATE TABLE orders (order_id BIGINT, user_id BIGINT)")?;
    }
    Ok(())
}

fn add_orders_total(conn: &Connection, schema: &dyn SchemaIntrospector) -> MigrateResult<()> {
    if !schema.has_column("orders", "total_cents")? {
        conn.execute_batch("ALTER TABLE orders ADD COLUMN total_cents BIGINT")?;
    }
    Ok(())
}

fn refuse(_conn: &Connection, _schema: &dyn SchemaIntrospector) -> MigrateResult<()> {
    Err(MigrateError::UpgradeAborted("not yet".to_string()))
}

static ORDERS: &[Migration] = &[
    Migration::new("0001_orders", "create orders", add_orders_table),
    Migration::new("0002_orders_total", "add orders.total_cents", add_orders_total),
];

static ORDERS_BROKEN: &[Migration] = &[
    Migration::new("0001_orders", "create orders", add_orders_table),
    Migration::new("0002_orders_total", "add orders.total_cents", refuse),
];

// ── Restart scenarios ──────────────────────────────────────────────────

#[test]
fn catalog_survives_reopen_without_reapplying() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.duckdb");
    let migrator = Migrator::new(catalog::registry().unwrap());

    {
        let store = Store::open(&path).unwrap();
        create_users(store.conn());
        let report = store.migrate(&migrator).unwrap();
        assert_eq!(report.applied.len(), catalog::MIGRATIONS.len());
    }

    let store = Store::open(&path).unwrap();
    let report = store.migrate(&migrator).unwrap();
    assert!(report.is_noop());
    assert_eq!(report.skipped.len(), catalog::MIGRATIONS.len());
    assert!(migrator.is_fully_migrated(store.conn()).unwrap());
    assert_eq!(
        count(
            store.conn(),
            "SELECT COUNT(*) FROM users WHERE referral_code IS NULL"
        ),
        0
    );
}

#[test]
fn failed_run_resumes_after_restart_with_fix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.duckdb");

    {
        let store = Store::open(&path).unwrap();
        let broken = Migrator::new(Registry::new(ORDERS_BROKEN).unwrap());
        let err = store.migrate(&broken).unwrap_err();
        assert_eq!(err.migration_id(), Some("0002_orders_total"));
    }

    let store = Store::open(&path).unwrap();
    let fixed = Migrator::new(Registry::new(ORDERS).unwrap());
    assert!(!fixed.is_fully_migrated(store.conn()).unwrap());
    let pending: Vec<&str> = fixed
        .pending(store.conn())
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(pending, vec!["0002_orders_total"]);

    let report = store.migrate(&fixed).unwrap();
    assert_eq!(report.skipped, vec!["0001_orders"]);
    assert_eq!(report.applied, vec!["0002_orders_total"]);
    assert!(fixed.is_fully_migrated(store.conn()).unwrap());
}

#[test]
fn status_after_partial_run() {
    let store = Store::open_memory().unwrap();
    let broken = Migrator::new(Registry::new(ORDERS_BROKEN).unwrap());
    store.migrate(&broken).unwrap_err();

    let status = broken.status(store.conn()).unwrap();
    assert_eq!(status.applied_count(), 1);
    assert_eq!(status.migrations[1].id, "0002_orders_total");
    assert!(status.migrations[1].applied_at.is_none());
}

// ── Concurrent runners ─────────────────────────────────────────────────

#[test]
fn concurrent_runners_converge() {
    let store = Store::open_memory().unwrap();
    create_users(store.conn());
    let registry = catalog::registry().unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let conn = store.connect().unwrap();
            std::thread::spawn(move || Migrator::new(registry).run(&conn))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(
        results.iter().any(Result::is_ok),
        "no runner completed: {results:?}"
    );
    for result in &results {
        if let Err(err) = result {
            assert!(err.is_race(), "loser must report a race, got {err:?}");
        }
    }

    // No id is ever recorded twice.
    let conn = store.conn();
    assert_eq!(
        count(conn, "SELECT COUNT(*) FROM schema_migrations"),
        count(conn, "SELECT COUNT(DISTINCT id) FROM schema_migrations")
    );

    // A restart of the loser finishes whatever is left and changes nothing else.
    let migrator = Migrator::new(registry);
    migrator.run(conn).unwrap();
    assert!(migrator.is_fully_migrated(conn).unwrap());
    assert_eq!(
        count(conn, "SELECT COUNT(*) FROM schema_migrations"),
        catalog::MIGRATIONS.len() as i64
    );
}

#[test]
fn concurrent_history_creation_is_safe() {
    let store = Store::open_memory().unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let conn = store.connect().unwrap();
            std::thread::spawn(move || HistoryStore::default().ensure_exists(&conn))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert!(HistoryStore::default().exists(store.conn()).unwrap());
}
