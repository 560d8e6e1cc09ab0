//! Error types for the migration engine.

use thiserror::Error;

/// Migration engine errors.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Failed to open or create the target store (M001).
    #[error("[M001] Store connection failed: {0}")]
    ConnectionError(String),

    /// The bookkeeping table could not be created or read (M002).
    #[error("[M002] Migration history store unavailable: {0}")]
    StoreUnavailable(String),

    /// An upgrade procedure, or the scope around it, failed (M003).
    #[error("[M003] Migration {id} ({description}) failed")]
    MigrationFailure {
        id: String,
        description: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Another run recorded the same migration first (M004).
    #[error("[M004] Migration {id} ({description}) was applied by a concurrent run")]
    DuplicateApplicationRace {
        id: String,
        description: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Transaction management error (M005).
    #[error("[M005] Transaction failed: {0}")]
    TransactionError(String),

    /// SQL execution error outside an upgrade body (M006).
    #[error("[M006] Query failed: {0}")]
    QueryError(String),

    /// The registry violates its construction rules (M007).
    #[error("[M007] Invalid migration registry: {0}")]
    InvalidRegistry(String),

    /// Lookup of an id the registry does not contain (M008).
    #[error("[M008] Unknown migration: {0}")]
    UnknownMigration(String),

    /// Identifier rejected before being spliced into SQL (M009).
    #[error("[M009] Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    /// An upgrade body refused to run against the current store state (M010).
    #[error("[M010] Upgrade aborted: {0}")]
    UpgradeAborted(String),

    /// Configuration file not found (M011).
    #[error("[M011] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration file could not be parsed (M012).
    #[error("[M012] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// Configuration value rejected by validation (M013).
    #[error("[M013] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// IO error with the offending path (M014).
    #[error("[M014] IO error at {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// DuckDB driver error with preserved source chain (M015).
    #[error("[M015] DuckDB error")]
    DuckDb(#[source] duckdb::Error),
}

/// Result type alias for [`MigrateError`].
pub type MigrateResult<T> = Result<T, MigrateError>;

impl MigrateError {
    /// Id of the migration this error is attributed to, if any.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            MigrateError::MigrationFailure { id, .. }
            | MigrateError::DuplicateApplicationRace { id, .. } => Some(id),
            _ => None,
        }
    }

    /// True when the error means a concurrent run already applied the migration.
    pub fn is_race(&self) -> bool {
        matches!(self, MigrateError::DuplicateApplicationRace { .. })
    }
}

impl From<duckdb::Error> for MigrateError {
    fn from(err: duckdb::Error) -> Self {
        MigrateError::DuckDb(err)
    }
}

impl From<serde_yaml::Error> for MigrateError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrateError::ConfigParseError {
            message: err.to_string(),
        }
    }
}

fn driver_message(err: &MigrateError) -> Option<String> {
    match err {
        MigrateError::DuckDb(e) => Some(e.to_string()),
        MigrateError::TransactionError(m) | MigrateError::QueryError(m) => Some(m.clone()),
        _ => None,
    }
}

/// Driver messages for a transaction that lost to a concurrent writer.
///
/// The last one is raised at COMMIT when another transaction altered a table
/// this one modified.
const CONFLICT_MESSAGES: &[&str] = &[
    "write-write conflict",
    "Conflict on",
    "another transaction has altered this table",
];

/// Whether DuckDB aborted the statement because another transaction touched
/// the same catalog entry or row first.
///
/// duckdb::Error does not expose structured variants, so the message is
/// matched.
pub(crate) fn is_write_conflict(err: &MigrateError) -> bool {
    driver_message(err).is_some_and(|msg| CONFLICT_MESSAGES.iter().any(|m| msg.contains(m)))
}

/// Whether recording or committing a migration failed because a concurrent
/// run got there first: a primary-key violation on the history table or a
/// write-write conflict.
pub(crate) fn is_concurrent_write(err: &MigrateError) -> bool {
    is_write_conflict(err)
        || driver_message(err).is_some_and(|msg| {
            msg.contains("Duplicate key") || msg.contains("violates primary key constraint")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_id_only_on_attributed_errors() {
        let err = MigrateError::MigrationFailure {
            id: "0001_a".to_string(),
            description: "a".to_string(),
            source: Box::new(MigrateError::UpgradeAborted("boom".to_string())),
        };
        assert_eq!(err.migration_id(), Some("0001_a"));
        assert!(!err.is_race());
        assert_eq!(MigrateError::QueryError("x".to_string()).migration_id(), None);
    }

    #[test]
    fn failure_message_carries_id_and_description() {
        let err = MigrateError::DuplicateApplicationRace {
            id: "0002_b".to_string(),
            description: "add b".to_string(),
            source: Box::new(MigrateError::QueryError("Duplicate key".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("[M004]"));
        assert!(msg.contains("0002_b"));
        assert!(msg.contains("add b"));
        assert!(err.is_race());
    }

    #[test]
    fn concurrent_write_classification() {
        assert!(is_concurrent_write(&MigrateError::QueryError(
            "Constraint Error: Duplicate key \"id: 0001\" violates primary key constraint"
                .to_string()
        )));
        assert!(is_concurrent_write(&MigrateError::TransactionError(
            "COMMIT failed: TransactionContext Error: Catalog write-write conflict on alter"
                .to_string()
        )));
        assert!(!is_concurrent_write(&MigrateError::QueryError(
            "Parser Error: syntax error".to_string()
        )));
        assert!(!is_concurrent_write(&MigrateError::UpgradeAborted(
            "Duplicate key".to_string()
        )));
    }

    #[test]
    fn write_conflict_excludes_plain_key_violations() {
        assert!(is_write_conflict(&MigrateError::QueryError(
            "TransactionContext Error: Conflict on tuple deletion".to_string()
        )));
        assert!(!is_write_conflict(&MigrateError::QueryError(
            "Constraint Error: Duplicate key \"user_id: 1\"".to_string()
        )));
    }

    #[test]
    fn commit_after_concurrent_alter_is_a_conflict() {
        let err = MigrateError::TransactionError(
            "COMMIT failed: TransactionContext Error: Failed to commit: Attempting to modify \
             table users but another transaction has altered this table"
                .to_string(),
        );
        assert!(is_write_conflict(&err));
        assert!(is_concurrent_write(&err));
    }
}
