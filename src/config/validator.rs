//! Settings validation: identifiers, primary key and filter consistency.

use crate::config::TableSettings;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

/// Whether `s` may be interpolated into SQL as a quoted identifier.
pub fn is_identifier(s: &str) -> bool {
    identifier_pattern().is_match(s)
}

pub fn validate(table: &str, settings: &TableSettings) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        table: table.to_string(),
        reason,
    };

    let physical = settings.source.table.as_deref().unwrap_or(table);
    if !is_identifier(physical) {
        return Err(invalid(format!("invalid table identifier '{}'", physical)));
    }
    if let Some(schema) = settings.source.schema.as_deref() {
        if !is_identifier(schema) {
            return Err(invalid(format!("invalid schema identifier '{}'", schema)));
        }
    }

    let mut names = HashSet::new();
    for c in &settings.columns {
        if !is_identifier(&c.name) {
            return Err(invalid(format!("invalid column identifier '{}'", c.name)));
        }
        if !names.insert(c.name.as_str()) {
            return Err(invalid(format!("duplicate column '{}'", c.name)));
        }
    }
    if !names.contains(settings.primary()) {
        return Err(invalid(format!("primary column '{}' is not a configured column", settings.primary())));
    }

    let mut filter_names = HashSet::new();
    for f in settings.filters() {
        if !filter_names.insert(f.name.as_str()) {
            return Err(invalid(format!("duplicate filter '{}'", f.name)));
        }
        let column = settings
            .column(f.column_name())
            .ok_or_else(|| invalid(format!("filter '{}' references unknown column '{}'", f.name, f.column_name())))?;
        if let Some(ops) = &f.operators {
            if let Some(op) = ops.iter().find(|op| !op.compatible_with(column.type_)) {
                return Err(invalid(format!(
                    "filter '{}' allows {:?}, which {:?} column '{}' does not support",
                    f.name, op, column.type_, column.name
                )));
            }
        }
    }
    Ok(())
}
