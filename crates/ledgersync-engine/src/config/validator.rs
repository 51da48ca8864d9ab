//! Semantic validation for parsed sync configuration values.

use std::collections::BTreeSet;

use anyhow::{bail, Result};

use crate::config::types::SyncConfig;

/// Validate a parsed sync configuration.
///
/// # Errors
///
/// Returns an error listing every validation failure found.
pub fn validate_config(config: &SyncConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.project.trim().is_empty() {
        errors.push("Project name must not be empty".to_string());
    }

    if config.secondary.path.as_os_str().is_empty() {
        errors.push("secondary.path must not be empty".to_string());
    }

    match config.delimiter() {
        None => errors.push(format!(
            "Delimiter '{}' must be exactly one character",
            config.sync.delimiter.escape_debug()
        )),
        Some(c @ ('"' | '\n' | '\r')) => errors.push(format!(
            "Delimiter '{}' cannot be a quote or line break",
            c.escape_debug()
        )),
        Some(_) => {}
    }

    for (i, index) in config.primary.indexes.iter().enumerate() {
        if index.collection.trim().is_empty() {
            errors.push(format!("primary.indexes[{i}] has an empty collection"));
        }
        if index.fields.len() < 2 {
            errors.push(format!(
                "primary.indexes[{i}] must name at least two fields to be composite"
            ));
        }
    }

    let mut seen = BTreeSet::new();
    for entity in &config.entities {
        if !seen.insert(entity.entity) {
            errors.push(format!("Entity '{}' is configured more than once", entity.entity));
        }
        for field in &entity.required {
            if field.trim().is_empty() {
                errors.push(format!("Entity '{}' lists an empty required field", entity.entity));
            }
        }
    }

    if let Err(e) = config.registry() {
        errors.push(format!("Entity mapping: {e}"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}
