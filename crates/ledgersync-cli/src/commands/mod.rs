pub mod check;
pub mod export;
pub mod history;
pub mod query;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};
use ledgersync_engine::config::{parse_config, validate_config, SyncConfig};
use ledgersync_engine::{MemoryDocumentStore, Registry};
use ledgersync_state::SqliteLocalStore;
use ledgersync_types::entity::EntityType;

/// Parsed, validated configuration and the registry built from it.
pub struct Loaded {
    pub config: SyncConfig,
    pub registry: Registry,
}

/// Parse and validate the config file, then build the registry.
pub fn load(config_path: &Path) -> Result<Loaded> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validate_config(&config)?;
    let registry = config.registry()?;
    tracing::debug!(
        project = config.project,
        entities = config.entities.len(),
        "Config validated"
    );
    Ok(Loaded { config, registry })
}

impl Loaded {
    /// Primary store from the configured snapshot, with configured indexes.
    pub fn primary(&self) -> Result<MemoryDocumentStore> {
        let store = match &self.config.primary.snapshot {
            Some(path) => MemoryDocumentStore::load(path)?,
            None => MemoryDocumentStore::new(self.config.project.clone()),
        };
        for index in &self.config.primary.indexes {
            let fields: Vec<&str> = index.fields.iter().map(String::as_str).collect();
            store.add_index(&index.collection, &fields);
        }
        Ok(store)
    }

    /// Write the primary store back to its snapshot, if one is configured.
    pub fn save_primary(&self, store: &MemoryDocumentStore) -> Result<()> {
        if let Some(path) = &self.config.primary.snapshot {
            store.save(path)?;
            tracing::info!(path = %path.display(), "Primary snapshot saved");
        }
        Ok(())
    }

    pub fn local(&self) -> Result<SqliteLocalStore> {
        let path = &self.config.secondary.path;
        SqliteLocalStore::open(path)
            .with_context(|| format!("Failed to open local store: {}", path.display()))
    }
}

/// Parse entity names given on the command line.
pub fn parse_entities(names: &[String]) -> Result<Vec<EntityType>> {
    names
        .iter()
        .map(|n| n.parse::<EntityType>().map_err(anyhow::Error::from))
        .collect()
}
