//! Schema migration engine for Strata.
//!
//! Applies a release-ordered [`Registry`] of migrations to a DuckDB store
//! exactly once each, recording completions in a bookkeeping table so that
//! restarts resume at the first unapplied migration.

pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod introspect;
pub mod registry;
pub mod runner;
pub mod scope;
pub mod sql_utils;
pub mod store;

pub use config::StrataConfig;
pub use error::{MigrateError, MigrateResult};
pub use history::{HistoryRecord, HistoryStore};
pub use introspect::{ColumnInfo, DuckDbIntrospector, SchemaIntrospector};
pub use registry::{Migration, Registry, UpgradeFn};
pub use runner::{MigrationPlan, MigrationStatus, Migrator, RunReport, StatusReport};
pub use scope::AtomicScope;
pub use store::Store;
