//! Local store error types.

/// Errors produced by [`LocalStore`](crate::LocalStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure with the operation that hit it.
    #[error("{context}: {source}")]
    SqliteContext {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record lacks a usable primary key value.
    #[error("record for table '{table}' has no value for primary key '{primary_key}'")]
    MissingKey { table: String, primary_key: String },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("local store lock poisoned")]
    LockPoisoned,
}

impl StateError {
    /// Attach the failing operation to a `SQLite` error.
    #[must_use]
    pub fn context(context: &'static str, source: rusqlite::Error) -> Self {
        Self::SqliteContext { context, source }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StateError::context("mark_synced: commit", inner);
        let msg = err.to_string();
        assert!(msg.starts_with("mark_synced: commit"), "got: {msg}");
    }

    #[test]
    fn lock_poisoned_displays() {
        let err = StateError::LockPoisoned;
        assert_eq!(err.to_string(), "local store lock poisoned");
    }

    #[test]
    fn missing_key_names_table_and_column() {
        let err = StateError::MissingKey {
            table: "transactions".into(),
            primary_key: "id".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("transactions") && msg.contains("'id'"));
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StateError::Io(inner);
        assert!(err.to_string().contains("i/o"));
    }
}
