//! List command implementation

use anyhow::{Context, Result};
use strata_migrate::{catalog, Registry};

use crate::commands::common::print_table;

/// Execute the list command
pub(crate) async fn execute() -> Result<()> {
    let registry = catalog::registry().context("Built-in migration catalog is invalid")?;
    print_table(&["#", "ID", "DESCRIPTION"], &list_rows(&registry));
    Ok(())
}

fn list_rows(registry: &Registry<'_>) -> Vec<Vec<String>> {
    registry
        .iter()
        .enumerate()
        .map(|(i, m)| vec![(i + 1).to_string(), m.id.to_string(), m.description.to_string()])
        .collect()
}
