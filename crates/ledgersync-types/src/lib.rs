//! Shared ledgersync entity, value, query, and error model types.
//!
//! This crate performs no I/O so that the engine, the local state store, and
//! the CLI can share one vocabulary without circular dependencies.

pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod state;
pub mod value;
