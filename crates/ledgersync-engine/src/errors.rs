//! Sync error model.

use ledgersync_state::StateError;
use ledgersync_types::entity::EntityType;
use ledgersync_types::error::StoreError;

// ---------------------------------------------------------------------------
// SyncError — categorised errors for per-entity continuation decisions
// ---------------------------------------------------------------------------

/// Categorized error returned by the sync and query operations.
///
/// A missing composite index is not represented here: the query executor
/// recovers from it and reports a remediation hint instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A record lacks a field its entity type declares as required.
    /// Raised before any store call; never retried.
    #[error("{entity}: record {index} is missing required field '{field}'")]
    Validation {
        entity: EntityType,
        index: usize,
        field: String,
    },

    /// A chunk commit failed after `committed_chunks` earlier chunks had
    /// been committed. Callers must treat the committed prefix as done.
    #[error(
        "{entity}: stopped after {committed_chunks} committed chunk(s) \
         ({committed_records} records): {source}"
    )]
    PartialSync {
        entity: EntityType,
        committed_chunks: usize,
        committed_records: usize,
        #[source]
        source: Box<SyncError>,
    },

    /// Primary-store failure, propagated as-is.
    #[error("primary store: {0}")]
    Store(#[from] StoreError),

    /// Local (secondary) store failure.
    #[error("local store: {0}")]
    Local(#[from] StateError),

    /// Failure writing an export artifact.
    #[error("export: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns `true` if retrying the whole call may succeed.
    ///
    /// Only transient primary-store failures qualify; retry policy itself
    /// belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::PartialSync { source, .. } => source.is_retryable(),
            Self::Validation { .. } | Self::Local(_) | Self::Io(_) => false,
        }
    }

    /// Records committed to the primary store before this error.
    pub fn committed_records(&self) -> usize {
        match self {
            Self::PartialSync {
                committed_records, ..
            } => *committed_records,
            _ => 0,
        }
    }
}
