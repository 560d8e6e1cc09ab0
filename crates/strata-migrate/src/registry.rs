//! Migration descriptors and the release-ordered registry that holds them.
//!
//! A [`Registry`] borrows a fixed slice of [`Migration`]s. Its order is the
//! deployment order: once a release ships, the relative position of two
//! descriptors never changes and new descriptors are only appended.

use crate::error::{MigrateError, MigrateResult};
use crate::introspect::SchemaIntrospector;
use duckdb::Connection;
use std::collections::HashSet;

/// Upgrade procedure of a single migration.
///
/// Must leave the store in the same end state when invoked again after a
/// partial, unrecorded attempt. Use the introspector to guard each statement.
pub type UpgradeFn = fn(&Connection, &dyn SchemaIntrospector) -> MigrateResult<()>;

/// A single migration descriptor.
#[derive(Clone, Copy)]
pub struct Migration {
    /// Stable id, never reused or renamed once shipped.
    pub id: &'static str,
    /// Human-readable description for logs and status output.
    pub description: &'static str,
    /// Procedure applying the change.
    pub upgrade: UpgradeFn,
}

impl Migration {
    pub const fn new(id: &'static str, description: &'static str, upgrade: UpgradeFn) -> Self {
        Self {
            id,
            description,
            upgrade,
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable sequence of migrations.
#[derive(Debug, Clone, Copy)]
pub struct Registry<'a> {
    migrations: &'a [Migration],
}

impl<'a> Registry<'a> {
    /// Wrap `migrations`, rejecting empty or duplicate ids.
    pub fn new(migrations: &'a [Migration]) -> MigrateResult<Self> {
        let mut seen = HashSet::with_capacity(migrations.len());
        for migration in migrations {
            if migration.id.trim().is_empty() {
                return Err(MigrateError::InvalidRegistry(format!(
                    "migration '{}' has an empty id",
                    migration.description
                )));
            }
            if !seen.insert(migration.id) {
                return Err(MigrateError::InvalidRegistry(format!(
                    "duplicate migration id '{}'",
                    migration.id
                )));
            }
        }
        Ok(Self { migrations })
    }

    /// Iterate in declared order.
    pub fn iter(&self) -> std::slice::Iter<'a, Migration> {
        self.migrations.iter()
    }

    pub fn get(&self, id: &str) -> Option<&'a Migration> {
        self.migrations.iter().find(|m| m.id == id)
    }

    /// Like [`Registry::get`] but fails with [`MigrateError::UnknownMigration`].
    pub fn require(&self, id: &str) -> MigrateResult<&'a Migration> {
        self.get(id)
            .ok_or_else(|| MigrateError::UnknownMigration(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.migrations.iter().map(|m| m.id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<'a> IntoIterator for &Registry<'a> {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
