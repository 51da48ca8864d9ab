//! Sync orchestrator: runs pull, push, and export per entity type.
//!
//! Entity types are processed one after another and independently: a
//! failure is logged, recorded in the run history, and reported in the
//! entity's [`EntityOutcome`], and the next entity type still runs.

use std::path::PathBuf;
use std::time::Instant;

use ledgersync_state::LocalStore;
use ledgersync_types::entity::EntityType;
use ledgersync_types::state::{RunKind, RunStats, RunStatus};
use serde::{Deserialize, Serialize};

use crate::delimited::write_table_file;
use crate::delta::{pull_remote, sync_unsynced};
use crate::errors::SyncError;
use crate::export::export_all;
use crate::merge::MergePolicy;
use crate::primary::DocumentStore;
use crate::registry::Registry;
use crate::result::{EntityOutcome, SyncReport};

/// Which way records flow in a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Local changes to the primary store only.
    Push,
    /// Primary-store records into the local store only.
    Pull,
    #[default]
    Both,
}

impl SyncDirection {
    #[must_use]
    pub fn pulls(self) -> bool {
        matches!(self, Self::Pull | Self::Both)
    }

    #[must_use]
    pub fn pushes(self) -> bool {
        matches!(self, Self::Push | Self::Both)
    }
}

/// Options for [`run_sync`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub direction: SyncDirection,
    /// Entity types to process; empty means all.
    pub entities: Vec<EntityType>,
    /// Write a delimited artifact per entity type into this directory.
    pub export_dir: Option<PathBuf>,
    pub delimiter: char,
    pub merge: MergePolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            direction: SyncDirection::Both,
            entities: Vec::new(),
            export_dir: None,
            delimiter: ',',
            merge: MergePolicy::default(),
        }
    }
}

impl SyncOptions {
    fn selected(&self) -> Vec<EntityType> {
        if self.entities.is_empty() {
            EntityType::ALL.to_vec()
        } else {
            self.entities.clone()
        }
    }
}

/// Run a sync over the selected entity types.
///
/// For each entity type: pull (merge remote into local), then push
/// (unsynced local records to remote), then export. A failing step ends
/// that entity type's run; the remaining entity types are unaffected.
pub async fn run_sync<S: DocumentStore>(
    store: &S,
    local: &dyn LocalStore,
    registry: &Registry,
    options: &SyncOptions,
) -> SyncReport {
    let start = Instant::now();
    let entities = options.selected();
    tracing::info!(
        direction = ?options.direction,
        entities = entities.len(),
        "Starting sync run"
    );

    let mut report = SyncReport::default();
    for entity in entities {
        let mut outcome = EntityOutcome::new(entity);
        if let Err(err) = sync_entity(store, local, registry, options, &mut outcome).await {
            tracing::error!(
                entity = %entity,
                retryable = err.is_retryable(),
                committed_records = err.committed_records(),
                error = %err,
                "Entity sync failed, continuing with remaining entity types"
            );
            outcome.retryable = err.is_retryable();
            outcome.error = Some(err.to_string());
        } else {
            tracing::info!(
                entity = %entity,
                pulled = outcome.pulled,
                pushed = outcome.pushed,
                exported = outcome.exported,
                skipped = outcome.skipped,
                "Entity sync complete"
            );
        }
        report.entities.push(outcome);
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    tracing::info!(
        failed = report.failures().count(),
        pushed = report.total_pushed(),
        pulled = report.total_pulled(),
        duration_secs = report.duration_secs,
        "Sync run finished"
    );
    report
}

async fn sync_entity<S: DocumentStore>(
    store: &S,
    local: &dyn LocalStore,
    registry: &Registry,
    options: &SyncOptions,
    outcome: &mut EntityOutcome,
) -> Result<(), SyncError> {
    let entity = outcome.entity;

    if options.direction.pulls() {
        let run = begin_run(local, entity, RunKind::Pull);
        let result = pull_remote(store, local, registry, entity, &options.merge).await;
        let stats = result.as_ref().map(|s| RunStats {
            records_read: s.fetched as u64,
            records_written: s.written() as u64,
            records_skipped: s.skipped as u64,
            error_message: None,
        });
        finish_run(local, run, &stats);
        let pulled = result?;
        outcome.pulled = pulled.written();
        outcome.skipped += pulled.skipped;
    }

    if options.direction.pushes() {
        let run = begin_run(local, entity, RunKind::Push);
        let result = sync_unsynced(store, local, registry, entity).await;
        let stats = result.as_ref().map(|s| RunStats {
            records_read: s.selected as u64,
            records_written: s.pushed as u64,
            records_skipped: s.skipped as u64,
            error_message: None,
        });
        finish_run(local, run, &stats);
        let pushed = result?;
        outcome.pushed = pushed.pushed;
        outcome.skipped += pushed.skipped;
    }

    if let Some(dir) = &options.export_dir {
        let run = begin_run(local, entity, RunKind::Export);
        let result = export_entity(store, registry, entity, dir, options.delimiter).await;
        let stats = result.as_ref().map(|(count, _)| RunStats {
            records_read: *count as u64,
            records_written: *count as u64,
            ..RunStats::default()
        });
        finish_run(local, run, &stats);
        let (count, path) = result?;
        outcome.exported = count;
        outcome.export_path = Some(path);
    }

    Ok(())
}

async fn export_entity<S: DocumentStore>(
    store: &S,
    registry: &Registry,
    entity: EntityType,
    dir: &std::path::Path,
    delimiter: char,
) -> Result<(usize, PathBuf), SyncError> {
    let records = export_all(store, registry, entity).await?;
    let path = write_table_file(
        dir,
        registry.table_name_of(entity),
        &records,
        registry.primary_key_of(entity),
        delimiter,
    )?;
    tracing::debug!(entity = %entity, path = %path.display(), records = records.len(), "Wrote export artifact");
    Ok((records.len(), path))
}

// ---------------------------------------------------------------------------
// Run history
// ---------------------------------------------------------------------------

/// Run-history bookkeeping never fails a sync; problems are logged.
fn begin_run(local: &dyn LocalStore, entity: EntityType, kind: RunKind) -> Option<i64> {
    match local.start_run(entity.as_str(), kind) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(entity = %entity, kind = %kind, error = %e, "Failed to record run start");
            None
        }
    }
}

fn finish_run(local: &dyn LocalStore, run: Option<i64>, result: &Result<RunStats, &SyncError>) {
    let Some(run_id) = run else {
        return;
    };
    let (status, stats) = match result {
        Ok(stats) => (RunStatus::Completed, stats.clone()),
        Err(err) => {
            let status = if matches!(err, SyncError::PartialSync { .. }) {
                RunStatus::Partial
            } else {
                RunStatus::Failed
            };
            let stats = RunStats {
                records_written: err.committed_records() as u64,
                error_message: Some(err.to_string()),
                ..RunStats::default()
            };
            (status, stats)
        }
    };
    if let Err(e) = local.complete_run(run_id, status, &stats) {
        tracing::warn!(run_id, error = %e, "Failed to record run completion");
    }
}
