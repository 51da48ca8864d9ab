//! Configuration types deserialized from the sync YAML file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ledgersync_types::entity::EntityType;
use ledgersync_types::schema::{EntitySchema, FieldType};
use serde::Deserialize;

use crate::merge::MergePolicy;
use crate::orchestrator::{SyncDirection, SyncOptions};
use crate::primary::CompositeIndex;
use crate::registry::{MappingOverride, Registry, RegistryError};

/// Top-level sync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub version: String,
    pub project: String,
    #[serde(default)]
    pub primary: PrimaryConfig,
    pub secondary: SecondaryConfig,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub merge: MergeConfig,
}

/// Primary (document) store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrimaryConfig {
    /// JSON snapshot file backing the document store.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
    /// Composite indexes the store can serve.
    #[serde(default)]
    pub indexes: Vec<CompositeIndex>,
}

/// Secondary (local) store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SecondaryConfig {
    pub path: PathBuf,
}

/// Override of one entity type's built-in mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    pub entity: EntityType,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Additional or retyped field declarations.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub infer_timestamps: Option<bool>,
}

impl EntityConfig {
    fn to_override(&self) -> MappingOverride {
        let declares_schema =
            !self.fields.is_empty() || !self.required.is_empty() || self.infer_timestamps.is_some();
        let schema = declares_schema.then(|| EntitySchema {
            fields: self.fields.clone(),
            required: self.required.iter().cloned().collect::<BTreeSet<_>>(),
            infer_timestamps: self.infer_timestamps.unwrap_or(true),
        });
        MappingOverride {
            collection: self.collection.clone(),
            table: self.table.clone(),
            primary_key: self.primary_key.clone(),
            schema,
        }
    }
}

/// Sync run settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    #[serde(default)]
    pub direction: SyncDirection,
    /// Entity types to process; empty means all.
    #[serde(default)]
    pub entities: Vec<EntityType>,
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            direction: SyncDirection::default(),
            entities: Vec::new(),
            export_dir: None,
            delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Merge policy for pulled records.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub ignore_fields: Vec<String>,
    #[serde(default = "default_prefer_remote")]
    pub prefer_remote: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ignore_fields: Vec::new(),
            prefer_remote: default_prefer_remote(),
        }
    }
}

fn default_prefer_remote() -> bool {
    true
}

impl SyncConfig {
    /// Registry with this configuration's entity overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the overrides break the mapping.
    pub fn registry(&self) -> Result<Registry, RegistryError> {
        let overrides: BTreeMap<EntityType, MappingOverride> = self
            .entities
            .iter()
            .map(|e| (e.entity, e.to_override()))
            .collect();
        Registry::with_overrides(&overrides)
    }

    #[must_use]
    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            prefer_remote: self.merge.prefer_remote,
            ignore_fields: self.merge.ignore_fields.clone(),
        }
    }

    /// The configured delimiter, if it is exactly one character.
    #[must_use]
    pub fn delimiter(&self) -> Option<char> {
        let mut chars = self.sync.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    /// Options for [`run_sync`](crate::run_sync). Falls back to `,` for an
    /// invalid delimiter; validation reports that case.
    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            direction: self.sync.direction,
            entities: self.sync.entities.clone(),
            export_dir: self.sync.export_dir.clone(),
            delimiter: self.delimiter().unwrap_or(','),
            merge: self.merge_policy(),
        }
    }

    /// Resolve relative paths against `base`, the config file's directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(snapshot) = self.primary.snapshot.as_mut() {
            resolve(snapshot);
        }
        resolve(&mut self.secondary.path);
        if let Some(dir) = self.sync.export_dir.as_mut() {
            resolve(dir);
        }
    }
}
