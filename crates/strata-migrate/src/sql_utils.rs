//! SQL identifier helpers for statements that cannot take bind parameters.

use crate::error::{MigrateError, MigrateResult};

/// Schema used when a table name carries no qualifier.
pub const DEFAULT_SCHEMA: &str = "main";

/// Quote a SQL identifier, doubling embedded double quotes.
///
/// # Examples
/// ```
/// use strata_migrate::sql_utils::quote_ident;
/// assert_eq!(quote_ident("users"), r#""users""#);
/// assert_eq!(quote_ident(r#"odd"name"#), r#""odd""name""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Split a potentially schema-qualified table name into (schema, table).
///
/// Uses the last `.` as the separator and falls back to [`DEFAULT_SCHEMA`].
///
/// # Examples
/// ```
/// use strata_migrate::sql_utils::split_qualified_name;
/// assert_eq!(split_qualified_name("users"), ("main", "users"));
/// assert_eq!(split_qualified_name("ops.schema_migrations"), ("ops", "schema_migrations"));
/// ```
pub fn split_qualified_name(name: &str) -> (&str, &str) {
    if let Some(pos) = name.rfind('.') {
        (&name[..pos], &name[pos + 1..])
    } else {
        (DEFAULT_SCHEMA, name)
    }
}

/// Accept only plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Config-supplied names end up inside DDL, so anything else is rejected
/// rather than quoted.
pub fn validate_ident(ident: &str) -> MigrateResult<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MigrateError::InvalidIdentifier(ident.to_string()))
    }
}

/// A validated `schema.table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// Build a reference from separate, validated parts.
    pub fn new(schema: &str, table: &str) -> MigrateResult<Self> {
        validate_ident(schema)?;
        validate_ident(table)?;
        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// The quoted `"schema"."table"` form for splicing into SQL.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    pub fn is_default_schema(&self) -> bool {
        self.schema == DEFAULT_SCHEMA
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[cfg(test)]
#[path = "sql_utils_test.rs"]
mod tests;
