//! Sync run result types.

use std::path::PathBuf;

use ledgersync_types::entity::EntityType;
use serde::Serialize;

/// What one entity type's part of a sync run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    pub entity: EntityType,
    /// Local rows inserted or updated from the primary store.
    pub pulled: usize,
    /// Local records written to the primary store.
    pub pushed: usize,
    pub exported: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
    /// Set when a step failed; later steps for this entity were not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
}

impl EntityOutcome {
    #[must_use]
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            pulled: 0,
            pushed: 0,
            exported: 0,
            skipped: 0,
            export_path: None,
            error: None,
            retryable: false,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-entity results of one [`run_sync`](crate::run_sync) call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub entities: Vec<EntityOutcome>,
    pub duration_secs: f64,
}

impl SyncReport {
    /// Whether every entity type completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.entities.iter().all(EntityOutcome::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.entities.iter().filter(|o| !o.is_ok())
    }

    #[must_use]
    pub fn outcome(&self, entity: EntityType) -> Option<&EntityOutcome> {
        self.entities.iter().find(|o| o.entity == entity)
    }

    #[must_use]
    pub fn total_pushed(&self) -> usize {
        self.entities.iter().map(|o| o.pushed).sum()
    }

    #[must_use]
    pub fn total_pulled(&self) -> usize {
        self.entities.iter().map(|o| o.pulled).sum()
    }
}
