//! Local store trait definition.
//!
//! [`LocalStore`] is the secondary-store contract: fixed tables per entity
//! type, a SyncMarker per row, transactional multi-row writes, and the
//! sync-run history.

use ledgersync_types::state::{RunKind, RunStats, RunStatus};
use ledgersync_types::value::Record;

use crate::error;
use crate::schema::TableSpec;

/// One row of sync-run history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub entity: String,
    pub kind: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats: RunStats,
}

/// Storage contract for the secondary store.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn LocalStore>`.
/// Each multi-row write runs in exactly one transaction; nothing here
/// spans more than one call.
pub trait LocalStore: Send + Sync {
    /// Create the table described by `spec` if missing, adding any declared
    /// columns an existing table lacks.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn ensure_table(&self, spec: &TableSpec) -> error::Result<()>;

    /// Insert a new local record with its SyncMarker false.
    ///
    /// # Errors
    ///
    /// Fails if the key already exists or the record has no key.
    fn insert(&self, spec: &TableSpec, record: &Record) -> error::Result<()>;

    /// Fetch one record by key, SyncMarker included.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get(&self, spec: &TableSpec, key: &str) -> error::Result<Option<Record>>;

    /// Every record in the table, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn all(&self, spec: &TableSpec) -> error::Result<Vec<Record>>;

    /// Records whose SyncMarker is false or absent, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn unsynced(&self, spec: &TableSpec) -> error::Result<Vec<Record>>;

    /// Set the SyncMarker of every row in `keys` to true, in one transaction.
    ///
    /// Returns the number of rows updated. There is deliberately no inverse.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure;
    /// the transaction is rolled back and no marker changes.
    fn mark_synced(&self, spec: &TableSpec, keys: &[String]) -> error::Result<usize>;

    /// Write merged records in one transaction.
    ///
    /// Existing rows have their data replaced and keep their SyncMarker.
    /// New rows already match the primary store and start with the marker
    /// true, so they are never pushed back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure;
    /// the transaction is rolled back.
    fn apply_merged(&self, spec: &TableSpec, records: &[Record]) -> error::Result<usize>;

    /// Begin a sync run for one entity and step, returning its ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, entity: &str, kind: RunKind) -> error::Result<i64>;

    /// Finalize a sync run with status and aggregate stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;

    /// Most recent runs first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn recent_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn LocalStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn LocalStore) {}
    }
}
