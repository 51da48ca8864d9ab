//! Export pipeline: primary-store collection to portable records.

use ledgersync_types::entity::EntityType;
use ledgersync_types::value::Record;

use crate::errors::SyncError;
use crate::normalize::Normalizer;
use crate::primary::DocumentStore;
use crate::registry::Registry;

/// Read every document of `entity`'s collection as a portable record.
///
/// The primary key is back-filled from the document identifier when the
/// declared key field is absent. Records come back in store iteration
/// order.
///
/// # Errors
///
/// Any read error aborts the export and is returned as-is; there is no
/// partial result.
pub async fn export_all<S: DocumentStore>(
    store: &S,
    registry: &Registry,
    entity: EntityType,
) -> Result<Vec<Record>, SyncError> {
    let collection = registry.collection_of(entity);
    let primary_key = registry.primary_key_of(entity);
    let normalizer = Normalizer::for_entity(registry, entity);

    let docs = store.scan(collection).await?;
    let records: Vec<Record> = docs
        .iter()
        .map(|doc| normalizer.document_to_record(doc, primary_key))
        .collect();

    tracing::debug!(entity = %entity, collection, records = records.len(), "Exported collection");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primary::MemoryDocumentStore;
    use chrono::{TimeZone, Utc};
    use ledgersync_types::error::StoreError;
    use ledgersync_types::value::{Fields, NativeValue};
    use serde_json::json;

    #[tokio::test]
    async fn exports_portable_records_with_backfilled_keys() {
        let store = MemoryDocumentStore::default();
        let mut fields = Fields::new();
        fields.insert(
            "createdAt".into(),
            NativeValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()),
        );
        fields.insert("amount".into(), NativeValue::Integer(42));
        store.put("transactions", "t1", fields);

        let records = export_all(&store, &Registry::builtin(), EntityType::Transaction)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("t1"));
        assert_eq!(records[0]["createdAt"], json!("2024-05-01T08:00:00Z"));
        assert_eq!(records[0]["amount"], json!(42));
    }

    #[tokio::test]
    async fn uses_mapped_collection_name() {
        let store = MemoryDocumentStore::default();
        store.put("categories", "c1", Fields::new());
        store.put("expense_categories", "wrong", Fields::new());

        let records = export_all(&store, &Registry::builtin(), EntityType::Category)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("c1"));
    }

    #[tokio::test]
    async fn read_errors_propagate() {
        let store = MemoryDocumentStore::default();
        store.fail_scans(Some(StoreError::unavailable("offline")));
        let err = export_all(&store, &Registry::builtin(), EntityType::User)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
