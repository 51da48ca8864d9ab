//! Primary (document) store contract and write batches.
//!
//! A [`WriteBatch`] can only be assembled from a [`Chunk`], and chunks only
//! come out of [`chunks`], which never yields more than
//! [`WRITE_BATCH_LIMIT`] items. An oversize batch therefore cannot be built.

mod memory;

use std::future::Future;

use ledgersync_types::error::StoreError;
use ledgersync_types::query::Query;
use ledgersync_types::value::{Document, Fields};

pub use memory::{CompositeIndex, MemoryDocumentStore, Snapshot};

/// Maximum operations the primary store accepts in one batched write.
pub const WRITE_BATCH_LIMIT: usize = 500;

/// Storage contract for the primary store.
///
/// Every call is one round trip; implementations do no retrying.
pub trait DocumentStore: Send + Sync {
    /// Every document in `collection`, in store iteration order.
    fn scan(&self, collection: &str) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Documents matching `query`.
    ///
    /// Fails with a `FAILED_PRECONDITION` error naming an index-creation URL
    /// when the query needs a composite index the store does not have.
    fn query(&self, query: &Query) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Apply every operation in `batch` atomically.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// One write in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or fully replace a document.
    Set {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Remove a document; deleting a missing document is not an error.
    Delete { collection: String, id: String },
}

impl WriteOp {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Set { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// A bounded slice of input, at most [`WRITE_BATCH_LIMIT`] long.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a, T> {
    /// Offset of the first item in the original input.
    offset: usize,
    items: &'a [T],
}

impl<'a, T> Chunk<'a, T> {
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn items(&self) -> &'a [T] {
        self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Split `items` into consecutive chunks of at most [`WRITE_BATCH_LIMIT`].
///
/// Concatenating the chunks yields `items` unchanged.
pub fn chunks<T>(items: &[T]) -> impl Iterator<Item = Chunk<'_, T>> {
    items
        .chunks(WRITE_BATCH_LIMIT)
        .enumerate()
        .map(|(i, items)| Chunk {
            offset: i * WRITE_BATCH_LIMIT,
            items,
        })
}

/// Operations committed together by one [`DocumentStore::commit`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Build a batch from a chunk, mapping each item to at most one op.
    ///
    /// `build` receives the item's index in the original input; returning
    /// `None` leaves the item out.
    pub fn from_chunk<T, F>(chunk: Chunk<'_, T>, mut build: F) -> Self
    where
        F: FnMut(usize, &T) -> Option<WriteOp>,
    {
        let ops = chunk
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| build(chunk.offset + i, item))
            .collect();
        Self { ops }
    }

    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
