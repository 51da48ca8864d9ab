//! Secondary-store persistence for ledgersync.
//!
//! Provides the [`LocalStore`] trait and a [`SqliteLocalStore`]
//! implementation holding one fixed-schema table per entity type, each
//! record's SyncMarker, and the sync-run history.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{LocalStore, RunRecord};
pub use error::StateError;
pub use schema::TableSpec;
pub use sqlite::SqliteLocalStore;

/// Convenience re-exports for benches and downstream tests.
pub mod prelude {
    pub use crate::backend::{LocalStore, RunRecord};
    pub use crate::schema::TableSpec;
    pub use crate::sqlite::SqliteLocalStore;
    pub use ledgersync_types::schema::{EntitySchema, FieldType};
    pub use ledgersync_types::state::{RunKind, RunStats, RunStatus};
    pub use ledgersync_types::value::Record;
}
