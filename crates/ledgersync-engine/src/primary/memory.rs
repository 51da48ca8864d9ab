//! In-process [`DocumentStore`] with snapshot persistence.
//!
//! Serves composite queries only when a matching index has been declared,
//! reproducing the primary store's index-requirement failure (with its
//! index-creation URL) otherwise. Commits are all-or-nothing and bounded at
//! [`WRITE_BATCH_LIMIT`] operations. Fault injection hooks let tests fail a
//! specific commit or query call.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use ledgersync_types::error::{StoreError, StoreErrorKind};
use ledgersync_types::query::{sort_documents, Query};
use ledgersync_types::value::{Document, Fields};
use serde::{Deserialize, Serialize};

use super::{DocumentStore, WriteBatch, WriteOp, WRITE_BATCH_LIMIT};

const DEFAULT_CONSOLE_URL: &str = "https://console.firebase.google.com/v1/r/project";

/// A declared composite index over `fields` of `collection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeIndex {
    pub collection: String,
    pub fields: Vec<String>,
}

impl CompositeIndex {
    fn covers(&self, query: &Query) -> bool {
        self.collection == query.collection
            && query
                .referenced_fields()
                .iter()
                .all(|f| self.fields.iter().any(|g| g == f))
    }
}

/// Serialized store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub indexes: Vec<CompositeIndex>,
    #[serde(default)]
    pub collections: BTreeMap<String, BTreeMap<String, Fields>>,
}

#[derive(Debug, Default)]
struct Faults {
    /// 1-based commit call that fails with `UNAVAILABLE`.
    commit_call: Option<usize>,
    /// 1-based query call and the error it fails with.
    query_call: Option<(usize, StoreError)>,
    scan_error: Option<StoreError>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
    indexes: Vec<CompositeIndex>,
    next_id: u64,
    commit_calls: usize,
    query_calls: usize,
    faults: Faults,
}

/// In-memory document store.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    project: String,
    inner: Mutex<Inner>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new("local")
    }
}

impl MemoryDocumentStore {
    /// Empty store for `project` with no composite indexes.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store seeded from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new(snapshot.project.unwrap_or_else(|| "local".to_string()));
        if let Ok(mut inner) = store.inner.lock() {
            inner.next_id = snapshot
                .collections
                .values()
                .flat_map(BTreeMap::keys)
                .filter_map(|id| id.strip_prefix("doc")?.parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            inner.collections = snapshot.collections;
            inner.indexes = snapshot.indexes;
        }
        store
    }

    /// Load a JSON snapshot file; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but can't be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty primary store");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the store's contents as a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot can't be serialized or written.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let snapshot = self.snapshot().map_err(anyhow::Error::from)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        Ok(())
    }

    /// Current contents.
    ///
    /// # Errors
    ///
    /// Fails only if the store lock is poisoned.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let inner = self.lock()?;
        Ok(Snapshot {
            project: Some(self.project.clone()),
            indexes: inner.indexes.clone(),
            collections: inner.collections.clone(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::internal("document store lock poisoned"))
    }

    /// Declare a composite index.
    pub fn add_index(&self, collection: &str, fields: &[&str]) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.indexes.push(CompositeIndex {
                collection: collection.to_string(),
                fields: fields.iter().map(|f| (*f).to_string()).collect(),
            });
        }
    }

    /// Insert or replace a document under `id`.
    pub fn put(&self, collection: &str, id: &str, fields: Fields) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), fields);
        }
    }

    /// Insert a document under a store-generated identifier.
    pub fn add(&self, collection: &str, fields: Fields) -> String {
        let Ok(mut inner) = self.inner.lock() else {
            return String::new();
        };
        inner.next_id += 1;
        let id = format!("doc{:08}", inner.next_id);
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        id
    }

    /// Fetch one document.
    #[must_use]
    pub fn get(&self, collection: &str, id: &str) -> Option<Fields> {
        let inner = self.inner.lock().ok()?;
        inner.collections.get(collection)?.get(id).cloned()
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.collections.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Fail the `call`-th commit (1-based, counting from store creation).
    pub fn fail_commit_call(&self, call: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.commit_call = Some(call);
        }
    }

    /// Fail the `call`-th query (1-based, counting from store creation).
    pub fn fail_query_call(&self, call: usize, error: StoreError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.query_call = Some((call, error));
        }
    }

    /// Fail every scan with `error` until cleared with `None`.
    pub fn fail_scans(&self, error: Option<StoreError>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults.scan_error = error;
        }
    }

    /// Commit calls attempted so far.
    #[must_use]
    pub fn commit_calls(&self) -> usize {
        self.inner.lock().map(|i| i.commit_calls).unwrap_or(0)
    }

    /// Query calls attempted so far.
    #[must_use]
    pub fn query_calls(&self) -> usize {
        self.inner.lock().map(|i| i.query_calls).unwrap_or(0)
    }

    fn index_required(&self, query: &Query) -> StoreError {
        let fields: Vec<&str> = query.referenced_fields().into_iter().collect();
        StoreError::failed_precondition(format!(
            "The query requires an index. You can create it here: \
             {DEFAULT_CONSOLE_URL}/{}/firestore/indexes?create_composite={}:{}",
            self.project,
            query.collection,
            fields.join(",")
        ))
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn scan(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let inner = self.lock()?;
        if let Some(err) = &inner.faults.scan_error {
            return Err(err.clone());
        }
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut inner = self.lock()?;
        inner.query_calls += 1;
        if let Some((call, err)) = &inner.faults.query_call {
            if *call == inner.query_calls {
                return Err(err.clone());
            }
        }

        if query.requires_composite_index() && !inner.indexes.iter().any(|idx| idx.covers(query)) {
            return Err(self.index_required(query));
        }

        let mut docs: Vec<Document> = inner
            .collections
            .get(&query.collection)
            .into_iter()
            .flatten()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .filter(|doc| query.matches(doc))
            .collect();
        sort_documents(&mut docs, query.order_by.as_ref());
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.commit_calls += 1;

        if inner.faults.commit_call == Some(inner.commit_calls) {
            return Err(StoreError::unavailable(format!(
                "commit {} failed: connection reset",
                inner.commit_calls
            )));
        }
        if batch.len() > WRITE_BATCH_LIMIT {
            return Err(StoreError::new(
                StoreErrorKind::BatchTooLarge,
                format!("{} operations exceed the limit of {WRITE_BATCH_LIMIT}", batch.len()),
            ));
        }
        if let Some(op) = batch.ops().iter().find(|op| op.id().is_empty()) {
            return Err(StoreError::new(
                StoreErrorKind::InvalidArgument,
                format!("empty document id in {op:?}"),
            ));
        }

        for op in batch.into_ops() {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    fields,
                } => {
                    inner.collections.entry(collection).or_default().insert(id, fields);
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = inner.collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primary::chunks;
    use ledgersync_types::query::{Direction, EqualityFilter, OrderBy, RangeFilter};
    use ledgersync_types::value::NativeValue;

    fn fields(pairs: &[(&str, NativeValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn composite_query() -> Query {
        let mut q = Query::collection("transactions");
        q.equals.push(EqualityFilter {
            field: "userId".into(),
            value: NativeValue::String("u1".into()),
        });
        q.range = Some(RangeFilter::between(
            "amount",
            NativeValue::Integer(0),
            NativeValue::Integer(100),
        ));
        q.order_by = Some(OrderBy {
            field: "amount".into(),
            direction: Direction::Descending,
        });
        q
    }

    fn seed(store: &MemoryDocumentStore) {
        for (id, user, amount) in [("a", "u1", 10), ("b", "u2", 20), ("c", "u1", 30)] {
            store.put(
                "transactions",
                id,
                fields(&[
                    ("userId", NativeValue::String(user.into())),
                    ("amount", NativeValue::Integer(amount)),
                ]),
            );
        }
    }

    #[tokio::test]
    async fn composite_query_without_index_names_remediation_url() {
        let store = MemoryDocumentStore::new("demo");
        seed(&store);
        let err = store.query(&composite_query()).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::FailedPrecondition);
        let msg = err.to_string();
        assert!(msg.contains("requires an index"), "got: {msg}");
        assert!(
            msg.contains("/demo/firestore/indexes?create_composite=transactions:amount,userId"),
            "got: {msg}"
        );
    }

    #[tokio::test]
    async fn composite_query_with_index_is_served_sorted() {
        let store = MemoryDocumentStore::new("demo");
        seed(&store);
        store.add_index("transactions", &["userId", "amount"]);
        let docs = store.query(&composite_query()).await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["c", "a"]);
    }

    #[tokio::test]
    async fn commit_is_atomic_and_counted() {
        let store = MemoryDocumentStore::default();
        store.fail_commit_call(1);
        let ops: Vec<usize> = (0..3).collect();
        let make = || {
            WriteBatch::from_chunk(chunks(&ops).next().unwrap(), |i, _| {
                Some(WriteOp::Set {
                    collection: "c".into(),
                    id: format!("d{i}"),
                    fields: Fields::new(),
                })
            })
        };

        assert!(store.commit(make()).await.is_err());
        assert_eq!(store.count("c"), 0);
        store.commit(make()).await.unwrap();
        assert_eq!(store.count("c"), 3);
        assert_eq!(store.commit_calls(), 2);
    }

    #[tokio::test]
    async fn delete_of_missing_document_is_ok() {
        let store = MemoryDocumentStore::default();
        store.put("c", "x", Fields::new());
        let ids = ["x", "y"];
        let batch = WriteBatch::from_chunk(chunks(&ids).next().unwrap(), |_, id| {
            Some(WriteOp::Delete {
                collection: "c".into(),
                id: (*id).to_string(),
            })
        });
        store.commit(batch).await.unwrap();
        assert_eq!(store.count("c"), 0);
    }

    #[tokio::test]
    async fn scan_faults_are_sticky_until_cleared() {
        let store = MemoryDocumentStore::default();
        store.fail_scans(Some(StoreError::unavailable("offline")));
        assert!(store.scan("c").await.is_err());
        assert!(store.scan("c").await.is_err());
        store.fail_scans(None);
        assert!(store.scan("c").await.unwrap().is_empty());
    }

    #[test]
    fn generated_ids_are_unique() {
        let store = MemoryDocumentStore::default();
        let a = store.add("c", Fields::new());
        let b = store.add("c", Fields::new());
        assert_ne!(a, b);
        assert_eq!(store.count("c"), 2);
    }

    #[test]
    fn snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.json");
        let store = MemoryDocumentStore::new("demo");
        seed(&store);
        store.add_index("transactions", &["userId", "amount"]);
        store.save(&path).unwrap();

        let loaded = MemoryDocumentStore::load(&path).unwrap();
        assert_eq!(loaded.count("transactions"), 3);
        assert_eq!(loaded.snapshot().unwrap(), store.snapshot().unwrap());
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryDocumentStore::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.count("transactions"), 0);
    }

    #[test]
    fn generated_ids_continue_after_snapshot_load() {
        let original = MemoryDocumentStore::new("demo");
        let first = original.add("accounts", fields(&[("name", NativeValue::String("a".into()))]));
        let second = original.add("accounts", fields(&[("name", NativeValue::String("b".into()))]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.json");
        original.save(&path).unwrap();

        let reloaded = MemoryDocumentStore::load(&path).unwrap();
        let third = reloaded.add("accounts", fields(&[("name", NativeValue::String("c".into()))]));
        assert!(third != first && third != second, "reused id {third}");
        assert_eq!(reloaded.count("accounts"), 3);
        assert_eq!(
            reloaded.get("accounts", &first).unwrap()["name"],
            NativeValue::String("a".into())
        );
    }
}
