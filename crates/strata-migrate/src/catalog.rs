//! Migrations shipped with this release, in deployment order.
//!
//! Append new entries at the end. Never reorder, rename, or remove a shipped
//! entry: stores record ids, and later entries may rely on earlier ones.
//!
//! The `users` table itself belongs to the application; these migrations only
//! evolve it. Every statement is guarded so a body can be re-run after an
//! interrupted, unrecorded attempt.

use crate::error::{MigrateError, MigrateResult};
use crate::introspect::SchemaIntrospector;
use crate::registry::{Migration, Registry};
use duckdb::Connection;

const USERS: &str = "users";

/// All known migrations, in order.
pub static MIGRATIONS: &[Migration] = &[
    Migration::new(
        "0001_add_channel_subscription_fields",
        "Add columns to track required channel subscription verification",
        add_channel_subscription_fields,
    ),
    Migration::new(
        "0002_add_referral_code",
        "Store short referral codes for users and backfill existing rows",
        add_referral_code,
    ),
    Migration::new(
        "0003_normalize_referral_codes",
        "Normalize referral codes to uppercase for consistent lookups",
        normalize_referral_codes,
    ),
    Migration::new(
        "0004_add_terms_acceptance_fields",
        "Add columns to track terms of service acceptance (terms_accepted, terms_accepted_at, terms_version)",
        add_terms_acceptance_fields,
    ),
];

/// The built-in registry.
pub fn registry() -> MigrateResult<Registry<'static>> {
    Registry::new(MIGRATIONS)
}

fn require_users(schema: &dyn SchemaIntrospector) -> MigrateResult<()> {
    if schema.table_exists(USERS)? {
        Ok(())
    } else {
        Err(MigrateError::UpgradeAborted(format!(
            "table '{USERS}' does not exist; the application must create it first"
        )))
    }
}

/// Add each `(column, type)` to `users` unless already present.
fn add_missing_columns(
    conn: &Connection,
    schema: &dyn SchemaIntrospector,
    columns: &[(&str, &str)],
) -> MigrateResult<()> {
    let existing = schema.column_names(USERS)?;
    for (name, sql_type) in columns {
        if existing.contains(*name) {
            log::debug!("Migrator: {USERS}.{name} already present");
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {USERS} ADD COLUMN {name} {sql_type}"
        ))?;
    }
    Ok(())
}

fn add_channel_subscription_fields(
    conn: &Connection,
    schema: &dyn SchemaIntrospector,
) -> MigrateResult<()> {
    require_users(schema)?;
    add_missing_columns(
        conn,
        schema,
        &[
            ("channel_subscription_verified", "BOOLEAN"),
            ("channel_subscription_checked_at", "TIMESTAMPTZ"),
            ("channel_subscription_verified_for", "BIGINT"),
        ],
    )
}

fn add_referral_code(conn: &Connection, schema: &dyn SchemaIntrospector) -> MigrateResult<()> {
    require_users(schema)?;
    add_missing_columns(conn, schema, &[("referral_code", "VARCHAR(16)")])?;

    // random() is evaluated per row, so each user gets its own code.
    conn.execute_batch(
        "UPDATE users
         SET referral_code = upper(substr(
             md5(CAST(user_id AS VARCHAR) || CAST(random() AS VARCHAR)), 1, 9))
         WHERE referral_code IS NULL OR referral_code = ''",
    )?;
    Ok(())
}

fn normalize_referral_codes(
    conn: &Connection,
    schema: &dyn SchemaIntrospector,
) -> MigrateResult<()> {
    if !schema.has_column(USERS, "referral_code")? {
        return Ok(());
    }
    conn.execute_batch(
        "UPDATE users
         SET referral_code = upper(referral_code)
         WHERE referral_code IS NOT NULL
           AND referral_code <> upper(referral_code)",
    )?;
    Ok(())
}

fn add_terms_acceptance_fields(
    conn: &Connection,
    schema: &dyn SchemaIntrospector,
) -> MigrateResult<()> {
    require_users(schema)?;
    // The defaulted column goes last. On a non-empty table DuckDB fails the
    // COMMIT when another ALTER follows an ADD COLUMN ... DEFAULT in the same
    // transaction.
    add_missing_columns(
        conn,
        schema,
        &[
            ("terms_accepted_at", "TIMESTAMPTZ"),
            ("terms_version", "VARCHAR"),
            ("terms_accepted", "BOOLEAN DEFAULT FALSE"),
        ],
    )
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
