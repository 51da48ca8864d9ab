//! Cross-store synchronization and resilient-query engine.
//!
//! Mirrors records between the primary document store (system of record)
//! and the tabular local store, and serves range queries that survive a
//! missing composite index.

pub mod config;
pub mod delimited;
pub mod delta;
pub mod errors;
pub mod export;
pub mod merge;
pub mod normalize;
pub mod orchestrator;
pub mod primary;
pub mod query;
pub mod registry;
pub mod result;
pub mod upsert;

// Re-export public API for convenience
pub use config::SyncConfig;
pub use errors::SyncError;
pub use orchestrator::{run_sync, SyncDirection, SyncOptions};
pub use primary::{DocumentStore, MemoryDocumentStore, WRITE_BATCH_LIMIT};
pub use registry::Registry;
pub use result::{EntityOutcome, SyncReport};
