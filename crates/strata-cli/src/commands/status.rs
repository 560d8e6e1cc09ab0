//! Status command implementation

use anyhow::{Context, Result};
use strata_migrate::StatusReport;

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::{self, build_migrator, open_store, print_table};

/// Execute the status command
pub(crate) async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let store = open_store(&config)?;
    let migrator = build_migrator(&config)?;
    let mut report = migrator
        .status(store.conn())
        .context("Failed to read migration status")?;
    if let Some(id) = &args.id {
        let migration = migrator.registry().require(id)?;
        report.migrations.retain(|m| m.id == migration.id);
        report.unknown.clear();
    }

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{}", json);
        return Ok(());
    }

    print_table(&["#", "ID", "DESCRIPTION", "APPLIED AT"], &status_rows(&report));
    if args.id.is_some() {
        return Ok(());
    }
    println!(
        "\n{} applied, {} pending",
        report.applied_count(),
        report.pending_count()
    );
    if !report.unknown.is_empty() {
        println!("\nHistory rows not in this release:");
        for record in &report.unknown {
            println!("  {} ({})", record.id, format_timestamp(record.applied_at));
        }
    }
    Ok(())
}

pub(crate) fn status_rows(report: &StatusReport) -> Vec<Vec<String>> {
    report
        .migrations
        .iter()
        .enumerate()
        .map(|(i, m)| {
            vec![
                (i + 1).to_string(),
                m.id.to_string(),
                m.description.to_string(),
                m.applied_at
                    .map_or_else(|| "pending".to_string(), format_timestamp),
            ]
        })
        .collect()
}

fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
