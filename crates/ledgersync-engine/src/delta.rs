//! Incremental sync between the local store and the primary store.
//!
//! [`sync_unsynced`] pushes local records whose SyncMarker is false and is
//! the only code path that sets markers. [`pull_remote`] merges the primary
//! store's records into the local store and never changes an existing
//! marker.

use ledgersync_state::LocalStore;
use ledgersync_types::entity::EntityType;
use ledgersync_types::state::SYNC_MARKER_FIELD;
use ledgersync_types::value::{record_key, Record};

use crate::errors::SyncError;
use crate::export::export_all;
use crate::merge::{diff, merge, MergePolicy};
use crate::primary::{chunks, DocumentStore};
use crate::registry::Registry;
use crate::upsert::{upsert_chunks, UpsertSummary};

/// Outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Unsynced records selected from the local store.
    pub selected: usize,
    /// Records written to the primary store and marked synced.
    pub pushed: usize,
    pub skipped: usize,
}

/// Outcome of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl PullSummary {
    /// Rows written to the local store.
    #[must_use]
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Push every unsynced local record of `entity` to the primary store.
///
/// Markers of a chunk's records flip to true right after that chunk
/// commits. Records of a failed chunk keep their marker and are selected
/// again on the next run.
///
/// # Errors
///
/// Returns [`SyncError::PartialSync`] when a chunk fails after earlier
/// chunks were committed and marked, and the local or validation errors
/// of the underlying calls otherwise.
pub async fn sync_unsynced<S: DocumentStore>(
    store: &S,
    local: &dyn LocalStore,
    registry: &Registry,
    entity: EntityType,
) -> Result<PushSummary, SyncError> {
    let spec = registry.table_spec(entity);
    local.ensure_table(&spec)?;
    let pending = local.unsynced(&spec)?;
    if pending.is_empty() {
        tracing::debug!(entity = %entity, "Nothing to push");
        return Ok(PushSummary::default());
    }

    let UpsertSummary {
        committed_records,
        skipped,
        ..
    } = upsert_chunks(store, registry, entity, &pending, |ids| {
        local.mark_synced(&spec, ids)?;
        Ok(())
    })
    .await?;

    Ok(PushSummary {
        selected: pending.len(),
        pushed: committed_records,
        skipped: skipped.len(),
    })
}

/// Merge the primary store's records of `entity` into the local store.
///
/// Each remote record is compared with its local row; rows with no change
/// outside `policy.ignore_fields` are left alone. Writes go through one
/// local transaction per chunk. New rows arrive already marked synced.
///
/// # Errors
///
/// Returns the export error if the remote read fails, or the local error
/// of the failing chunk; earlier chunks stay applied.
pub async fn pull_remote<S: DocumentStore>(
    store: &S,
    local: &dyn LocalStore,
    registry: &Registry,
    entity: EntityType,
    policy: &MergePolicy,
) -> Result<PullSummary, SyncError> {
    let remote = export_all(store, registry, entity).await?;
    let spec = registry.table_spec(entity);
    local.ensure_table(&spec)?;

    let primary_key = registry.primary_key_of(entity);
    let mut ignore = policy.ignore_fields.clone();
    ignore.push(SYNC_MARKER_FIELD.to_string());

    let mut summary = PullSummary {
        fetched: remote.len(),
        ..PullSummary::default()
    };

    for chunk in chunks(&remote) {
        let mut writes: Vec<Record> = Vec::with_capacity(chunk.len());
        for record in chunk.items() {
            let Some(key) = record_key(record, primary_key) else {
                summary.skipped += 1;
                continue;
            };
            match local.get(&spec, &key)? {
                Some(existing) => {
                    if diff(&existing, record, &ignore).is_empty() {
                        summary.unchanged += 1;
                    } else {
                        writes.push(merge(&existing, record, policy.prefer_remote));
                        summary.updated += 1;
                    }
                }
                None => {
                    writes.push(record.clone());
                    summary.inserted += 1;
                }
            }
        }
        if !writes.is_empty() {
            local.apply_merged(&spec, &writes)?;
        }
    }

    tracing::info!(
        entity = %entity,
        fetched = summary.fetched,
        inserted = summary.inserted,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "Pull complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primary::MemoryDocumentStore;
    use ledgersync_state::SqliteLocalStore;
    use ledgersync_types::value::{Fields, NativeValue};
    use serde_json::json;

    fn account(id: &str, name: &str) -> Record {
        json!({"id": id, "name": name}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn push_marks_only_committed_records() {
        let store = MemoryDocumentStore::default();
        let local = SqliteLocalStore::in_memory().unwrap();
        let registry = Registry::builtin();
        let spec = registry.table_spec(EntityType::Account);
        local.ensure_table(&spec).unwrap();
        local.insert(&spec, &account("a1", "Checking")).unwrap();
        local.insert(&spec, &account("a2", "Savings")).unwrap();

        let summary = sync_unsynced(&store, &local, &registry, EntityType::Account)
            .await
            .unwrap();
        assert_eq!(summary.pushed, 2);
        assert!(local.unsynced(&spec).unwrap().is_empty());
        assert_eq!(store.count("accounts"), 2);

        let again = sync_unsynced(&store, &local, &registry, EntityType::Account)
            .await
            .unwrap();
        assert_eq!(again, PushSummary::default());
    }

    #[tokio::test]
    async fn failed_push_leaves_markers_false() {
        let store = MemoryDocumentStore::default();
        store.fail_commit_call(1);
        let local = SqliteLocalStore::in_memory().unwrap();
        let registry = Registry::builtin();
        let spec = registry.table_spec(EntityType::Account);
        local.ensure_table(&spec).unwrap();
        local.insert(&spec, &account("a1", "Checking")).unwrap();

        let err = sync_unsynced(&store, &local, &registry, EntityType::Account)
            .await
            .unwrap_err();
        assert_eq!(err.committed_records(), 0);
        assert_eq!(local.unsynced(&spec).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pull_inserts_updates_and_keeps_markers() {
        let store = MemoryDocumentStore::default();
        let local = SqliteLocalStore::in_memory().unwrap();
        let registry = Registry::builtin();
        let spec = registry.table_spec(EntityType::Account);
        local.ensure_table(&spec).unwrap();
        local.insert(&spec, &account("a1", "Old name")).unwrap();
        local.mark_synced(&spec, &["a1".to_string()]).unwrap();

        let mut fields = Fields::new();
        fields.insert("name".into(), NativeValue::String("New name".into()));
        store.put("accounts", "a1", fields.clone());
        store.put("accounts", "a2", fields);

        let summary = pull_remote(
            &store,
            &local,
            &registry,
            EntityType::Account,
            &MergePolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.inserted, 1);

        let a1 = local.get(&spec, "a1").unwrap().unwrap();
        assert_eq!(a1["name"], json!("New name"));
        assert_eq!(a1["synced"], json!(true));
        let a2 = local.get(&spec, "a2").unwrap().unwrap();
        assert_eq!(a2["synced"], json!(true));

        let second = pull_remote(
            &store,
            &local,
            &registry,
            EntityType::Account,
            &MergePolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.written(), 0);
    }
}
