//! Migration runner.
//!
//! A run ensures the history table exists, reads the applied set once, then
//! walks the registry in declared order. Each pending migration runs in its
//! own [`AtomicScope`] together with its history row, and commits before the
//! next one starts. The first failure rolls back that migration's scope and
//! ends the run; everything committed before it stays applied.

use crate::error::{is_concurrent_write, is_write_conflict, MigrateError, MigrateResult};
use crate::history::{HistoryRecord, HistoryStore};
use crate::introspect::DuckDbIntrospector;
use crate::registry::{Migration, Registry};
use crate::scope::AtomicScope;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Ids applied by this run, in application order.
    pub applied: Vec<&'static str>,
    /// Ids already recorded before the run started.
    pub skipped: Vec<&'static str>,
}

impl RunReport {
    /// True when the run found nothing to do.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applied/pending state of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: &'static str,
    pub description: &'static str,
    /// `None` while pending.
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Registry entries joined with the history table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// One entry per registry migration, in declared order.
    pub migrations: Vec<MigrationStatus>,
    /// History rows whose id the registry does not know.
    pub unknown: Vec<HistoryRecord>,
}

impl StatusReport {
    pub fn applied_count(&self) -> usize {
        self.migrations.iter().filter(|m| m.is_applied()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.migrations.len() - self.applied_count()
    }

    pub fn is_fully_migrated(&self) -> bool {
        self.pending_count() == 0
    }
}

/// Step of a migration's scope, used to classify failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Applying,
    Recording,
    Committing,
}

/// Pending work computed from a single snapshot of the history table.
///
/// The snapshot is not refreshed while the plan is applied.
#[derive(Debug, Clone)]
pub struct MigrationPlan<'r> {
    history: HistoryStore,
    pending: Vec<&'r Migration>,
    skipped: Vec<&'static str>,
}

impl<'r> MigrationPlan<'r> {
    /// Migrations to apply, in declared order.
    pub fn pending(&self) -> &[&'r Migration] {
        &self.pending
    }

    /// Ids found already applied when the plan was made.
    pub fn skipped(&self) -> &[&'static str] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every pending migration, stopping at the first failure.
    pub fn apply(self, conn: &Connection) -> MigrateResult<RunReport> {
        let mut report = RunReport {
            applied: Vec::with_capacity(self.pending.len()),
            skipped: self.skipped,
        };

        for migration in self.pending {
            log::info!(
                "Migrator: applying {}: {}",
                migration.id,
                migration.description
            );

            if let Err((phase, cause)) = apply_one(&self.history, conn, migration) {
                log::error!(
                    "Migrator: failed to apply {} ({}) while {:?}: {cause}",
                    migration.id,
                    migration.description,
                    phase
                );
                return Err(attribute(migration, phase, cause));
            }

            log::info!("Migrator: migration {} applied successfully", migration.id);
            report.applied.push(migration.id);
        }
        Ok(report)
    }
}

/// Run one migration and its history row inside a single scope.
fn apply_one(
    history: &HistoryStore,
    conn: &Connection,
    migration: &Migration,
) -> Result<(), (Phase, MigrateError)> {
    let scope = AtomicScope::begin(conn).map_err(|e| (Phase::Opening, e))?;
    let schema = DuckDbIntrospector::new(scope.conn());

    (migration.upgrade)(scope.conn(), &schema).map_err(|e| (Phase::Applying, e))?;
    history
        .record(scope.conn(), migration.id)
        .map_err(|e| (Phase::Recording, e))?;
    scope.commit().map_err(|e| (Phase::Committing, e))
}

/// Wrap `cause` with the migration it belongs to.
///
/// A key violation or conflict on the history row means another run applied
/// this migration first. Inside the upgrade body only a write-write conflict
/// counts, since the body's own statements may hit unrelated key violations.
fn attribute(migration: &Migration, phase: Phase, cause: MigrateError) -> MigrateError {
    let raced = match phase {
        Phase::Recording | Phase::Committing => is_concurrent_write(&cause),
        Phase::Applying => is_write_conflict(&cause),
        Phase::Opening => false,
    };
    let id = migration.id.to_string();
    let description = migration.description.to_string();
    let source = Box::new(cause);
    if raced {
        MigrateError::DuplicateApplicationRace {
            id,
            description,
            source,
        }
    } else {
        MigrateError::MigrationFailure {
            id,
            description,
            source,
        }
    }
}

/// Applies a [`Registry`] against a store, tracking progress in a
/// [`HistoryStore`].
#[derive(Debug, Clone)]
pub struct Migrator<'r> {
    registry: Registry<'r>,
    history: HistoryStore,
}

impl<'r> Migrator<'r> {
    /// Migrator using the default `main.schema_migrations` table.
    pub fn new(registry: Registry<'r>) -> Self {
        Self::with_history(registry, HistoryStore::default())
    }

    pub fn with_history(registry: Registry<'r>, history: HistoryStore) -> Self {
        Self { registry, history }
    }

    pub fn registry(&self) -> &Registry<'r> {
        &self.registry
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Ensure the history table exists and compute pending work.
    pub fn plan(&self, conn: &Connection) -> MigrateResult<MigrationPlan<'r>> {
        self.history.ensure_exists(conn)?;
        let applied = self.history.load_applied(conn)?;
        self.warn_unknown(&applied);

        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for migration in self.registry.iter() {
            if applied.contains(migration.id) {
                log::debug!("Migrator: {} already applied, skipping", migration.id);
                skipped.push(migration.id);
            } else {
                pending.push(migration);
            }
        }

        Ok(MigrationPlan {
            history: self.history.clone(),
            pending,
            skipped,
        })
    }

    /// Apply every pending migration in declared order.
    ///
    /// Blocks until the run completes or the first migration fails. Errors
    /// carry the failing migration's id and description; nothing is retried.
    pub fn run(&self, conn: &Connection) -> MigrateResult<RunReport> {
        let plan = self.plan(conn)?;
        if plan.is_empty() {
            log::debug!("Migrator: nothing to apply");
        } else {
            log::info!("Migrator: {} pending migration(s)", plan.pending().len());
        }
        plan.apply(conn)
    }

    /// Pending migrations without creating the history table.
    pub fn pending(&self, conn: &Connection) -> MigrateResult<Vec<&'r Migration>> {
        let applied = self.applied_if_exists(conn)?;
        Ok(self
            .registry
            .iter()
            .filter(|m| !applied.contains(m.id))
            .collect())
    }

    /// True iff every registry id has a history row. Read-only.
    pub fn is_fully_migrated(&self, conn: &Connection) -> MigrateResult<bool> {
        let applied = self.applied_if_exists(conn)?;
        Ok(self.registry.ids().all(|id| applied.contains(id)))
    }

    /// Per-migration status plus history rows the registry does not know.
    pub fn status(&self, conn: &Connection) -> MigrateResult<StatusReport> {
        let records = if self.history.exists(conn)? {
            self.history.records(conn)?
        } else {
            Vec::new()
        };
        let mut by_id: HashMap<&str, DateTime<Utc>> = records
            .iter()
            .map(|r| (r.id.as_str(), r.applied_at))
            .collect();

        let migrations = self
            .registry
            .iter()
            .map(|m| MigrationStatus {
                id: m.id,
                description: m.description,
                applied_at: by_id.remove(m.id),
            })
            .collect();
        let unknown = records
            .iter()
            .filter(|r| !self.registry.contains(&r.id))
            .cloned()
            .collect();

        Ok(StatusReport {
            migrations,
            unknown,
        })
    }

    fn applied_if_exists(&self, conn: &Connection) -> MigrateResult<HashSet<String>> {
        if self.history.exists(conn)? {
            self.history.load_applied(conn)
        } else {
            Ok(HashSet::new())
        }
    }

    fn warn_unknown(&self, applied: &HashSet<String>) {
        let mut unknown: Vec<&str> = applied
            .iter()
            .map(String::as_str)
            .filter(|id| !self.registry.contains(id))
            .collect();
        if unknown.is_empty() {
            return;
        }
        unknown.sort_unstable();
        log::warn!(
            "Migrator: history contains {} id(s) unknown to this build: {}",
            unknown.len(),
            unknown.join(", ")
        );
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
