//! Shared helpers for CLI commands

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use strata_migrate::{catalog, Migrator, Store, StrataConfig};

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and the connection closes cleanly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Empty: ExitCode is control flow, not a user-facing error.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Resolve configuration from `--config`, then `./strata.yml`, then defaults.
///
/// `--database` (or `STRATA_DATABASE`) overrides the configured path.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<StrataConfig> {
    load_config_in(global, Path::new("."))
}

pub(crate) fn load_config_in(global: &GlobalArgs, dir: &Path) -> Result<StrataConfig> {
    let config = match &global.config {
        Some(path) => StrataConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load config from {path}"))?,
        None if has_config_file(dir) => StrataConfig::load_from_dir(dir)
            .with_context(|| format!("Failed to load config from {}", dir.display()))?,
        None => {
            log::debug!("No strata.yml found, using defaults");
            StrataConfig::default()
        }
    };

    let config = match &global.database {
        Some(path) => config.with_database_path(path.clone()),
        None => config,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn has_config_file(dir: &Path) -> bool {
    strata_migrate::config::CONFIG_FILE_NAMES
        .iter()
        .any(|name| dir.join(name).exists())
}

/// Open the configured store.
pub(crate) fn open_store(config: &StrataConfig) -> Result<Store> {
    if config.is_in_memory() {
        log::warn!("Using an in-memory database; nothing will persist after exit");
    }
    Store::from_config(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.path))
}

/// Build a migrator for the built-in catalog and the configured history table.
pub(crate) fn build_migrator(config: &StrataConfig) -> Result<Migrator<'static>> {
    let registry = catalog::registry().context("Built-in migration catalog is invalid")?;
    let history = config
        .history_store()
        .context("Invalid history table configuration")?;
    Ok(Migrator::with_history(registry, history))
}

/// Calculate column widths for table output.
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }
    widths
}

/// Print a formatted table to stdout.
///
/// Left-aligned header row, a separator line of dashes, then each data row.
/// Columns are separated by two spaces.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
