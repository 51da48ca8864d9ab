//! Batched upsert pipeline: portable records to primary-store writes.
//!
//! Records are validated up front, split into chunks of at most
//! [`WRITE_BATCH_LIMIT`](crate::primary::WRITE_BATCH_LIMIT), and committed
//! one chunk at a time. A failed commit stops the call; the chunks before it
//! stay committed and are reported through [`SyncError::PartialSync`].

use ledgersync_types::entity::EntityType;
use ledgersync_types::state::{is_tombstone, SYNC_MARKER_FIELD, TOMBSTONE_FIELD};
use ledgersync_types::value::{record_key, Record};
use serde_json::Value;

use crate::errors::SyncError;
use crate::normalize::Normalizer;
use crate::primary::{chunks, DocumentStore, WriteBatch, WriteOp};
use crate::registry::Registry;

/// A record left out of the upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position in the input.
    pub index: usize,
    pub reason: String,
}

/// Outcome of a fully committed upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub committed_chunks: usize,
    /// Set and delete operations committed.
    pub committed_records: usize,
    pub deleted: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Upsert `records` of `entity` into the primary store.
///
/// Each record's primary key becomes the document identifier and is left
/// out of the stored fields, as are the SyncMarker and tombstone fields.
/// Records carrying a tombstone are deleted. Records without a usable
/// primary key are skipped with a warning.
///
/// # Errors
///
/// - [`SyncError::Validation`] if a record lacks a required field; nothing
///   is written.
/// - [`SyncError::PartialSync`] if a chunk commit fails; earlier chunks
///   remain committed.
pub async fn upsert_all<S: DocumentStore>(
    store: &S,
    registry: &Registry,
    entity: EntityType,
    records: &[Record],
) -> Result<UpsertSummary, SyncError> {
    upsert_chunks(store, registry, entity, records, |_| Ok(())).await
}

/// [`upsert_all`] with a hook run after each successful chunk commit.
///
/// `on_committed` receives the document identifiers the chunk wrote. If it
/// fails, the call stops as if the next commit had failed.
pub(crate) async fn upsert_chunks<S, F>(
    store: &S,
    registry: &Registry,
    entity: EntityType,
    records: &[Record],
    mut on_committed: F,
) -> Result<UpsertSummary, SyncError>
where
    S: DocumentStore,
    F: FnMut(&[String]) -> Result<(), SyncError>,
{
    validate(registry, entity, records)?;

    let collection = registry.collection_of(entity);
    let primary_key = registry.primary_key_of(entity);
    let normalizer = Normalizer::for_entity(registry, entity);
    let skip = [primary_key, SYNC_MARKER_FIELD, TOMBSTONE_FIELD];

    let mut summary = UpsertSummary::default();

    for (chunk_no, chunk) in chunks(records).enumerate() {
        let mut deletes = 0;
        let batch = WriteBatch::from_chunk(chunk, |index, record| {
            let Some(id) = record_key(record, primary_key) else {
                tracing::warn!(
                    entity = %entity,
                    index,
                    primary_key,
                    "Skipping record without primary key"
                );
                summary.skipped.push(SkippedRecord {
                    index,
                    reason: format!("missing primary key '{primary_key}'"),
                });
                return None;
            };
            if is_tombstone(record) {
                deletes += 1;
                return Some(WriteOp::Delete {
                    collection: collection.to_string(),
                    id,
                });
            }
            Some(WriteOp::Set {
                collection: collection.to_string(),
                id,
                fields: normalizer.record_to_fields(record, &skip),
            })
        });

        if batch.is_empty() {
            continue;
        }
        let ids: Vec<String> = batch.ops().iter().map(|op| op.id().to_string()).collect();

        let committed = store
            .commit(batch)
            .await
            .map_err(SyncError::from)
            .and_then(|()| {
                summary.committed_chunks += 1;
                summary.committed_records += ids.len();
                summary.deleted += deletes;
                on_committed(&ids)
            });

        if let Err(source) = committed {
            tracing::error!(
                entity = %entity,
                chunk = chunk_no,
                committed_chunks = summary.committed_chunks,
                committed_records = summary.committed_records,
                error = %source,
                "Chunk commit failed, stopping upsert"
            );
            return Err(SyncError::PartialSync {
                entity,
                committed_chunks: summary.committed_chunks,
                committed_records: summary.committed_records,
                source: Box::new(source),
            });
        }

        tracing::debug!(
            entity = %entity,
            chunk = chunk_no,
            records = ids.len(),
            "Chunk committed"
        );
    }

    tracing::info!(
        entity = %entity,
        chunks = summary.committed_chunks,
        records = summary.committed_records,
        skipped = summary.skipped.len(),
        "Upsert complete"
    );
    Ok(summary)
}

/// Check required fields before any store call.
///
/// Tombstones and records already headed for the missing-key skip are not
/// checked.
fn validate(registry: &Registry, entity: EntityType, records: &[Record]) -> Result<(), SyncError> {
    let primary_key = registry.primary_key_of(entity);
    let required = &registry.schema_of(entity).required;

    for (index, record) in records.iter().enumerate() {
        if is_tombstone(record) || record_key(record, primary_key).is_none() {
            continue;
        }
        let missing = required
            .iter()
            .filter(|f| f.as_str() != primary_key)
            .find(|f| matches!(record.get(f.as_str()), None | Some(Value::Null)));
        if let Some(field) = missing {
            return Err(SyncError::Validation {
                entity,
                index,
                field: field.clone(),
            });
        }
    }
    Ok(())
}
