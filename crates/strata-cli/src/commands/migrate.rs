//! Migrate command implementation

use anyhow::{Context, Result};
use std::time::Duration;
use strata_migrate::{MigrateError, RunReport, StrataConfig};
use tokio::task::JoinHandle;

use crate::cli::{GlobalArgs, MigrateArgs};
use crate::commands::common::{self, build_migrator, open_store};

/// Process exit code when `--timeout` elapses.
pub(crate) const EXIT_TIMEOUT: i32 = 2;

/// Execute the migrate command
pub(crate) async fn execute(args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let deadline = args.timeout.map(Duration::from_secs);

    let task = tokio::task::spawn_blocking(move || migrate_store(&config));
    let Some(outcome) = await_with_deadline(task, deadline).await? else {
        // The blocking run cannot be cancelled and runtime shutdown waits
        // for it, so exit here. Uncommitted work never reaches the store.
        eprintln!(
            "Migration did not finish within {}s; aborting",
            args.timeout.unwrap_or_default()
        );
        std::process::exit(EXIT_TIMEOUT);
    };

    match outcome {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            if err
                .downcast_ref::<MigrateError>()
                .is_some_and(MigrateError::is_race)
            {
                log::warn!("Another runner is migrating this database; re-run once it finishes");
            }
            Err(err)
        }
    }
}

/// Open the configured store and apply the built-in catalog.
fn migrate_store(config: &StrataConfig) -> Result<RunReport> {
    let store = open_store(config)?;
    let migrator = build_migrator(config)?;
    store.migrate(&migrator).context("Migration run failed")
}

/// Await a blocking task, giving up once `deadline` passes.
///
/// Returns `Ok(None)` on timeout. The task keeps running in the background.
pub(crate) async fn await_with_deadline<T>(
    task: JoinHandle<T>,
    deadline: Option<Duration>,
) -> Result<Option<T>> {
    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => return Ok(None),
        },
        None => task.await,
    };
    joined.map(Some).context("Migration task panicked")
}

fn print_report(report: &RunReport) {
    if report.is_noop() {
        println!(
            "Database is up to date ({} migration(s) already applied)",
            report.skipped.len()
        );
        return;
    }
    for id in &report.applied {
        println!("  \u{2713} {id}");
    }
    println!(
        "\nApplied {} migration(s), {} already applied",
        report.applied.len(),
        report.skipped.len()
    );
}

#[cfg(test)]
#[path = "migrate_test.rs"]
mod tests;
