//! Check command implementation
//!
//! Health-check friendly: exits 0 when every registered migration is applied
//! and 1 otherwise. Never creates the history table.

use anyhow::{Context, Result};

use crate::cli::GlobalArgs;
use crate::commands::common::{self, build_migrator, open_store, ExitCode};

/// Execute the check command
pub(crate) async fn execute(global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let store = open_store(&config)?;
    let migrator = build_migrator(&config)?;

    let pending = migrator
        .pending(store.conn())
        .context("Failed to read migration history")?;
    if pending.is_empty() {
        println!(
            "Database is up to date ({} migration(s))",
            migrator.registry().len()
        );
        return Ok(());
    }

    println!("{} pending migration(s):", pending.len());
    for migration in &pending {
        println!("  {} - {}", migration.id, migration.description);
    }
    Err(ExitCode(1).into())
}

#[cfg(test)]
#[path = "check_test.rs"]
mod tests;
