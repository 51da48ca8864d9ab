//! Sync-run tracking and local-store marker model types.
//!
//! Pure data types shared by the engine and the local state store.

use serde::{Deserialize, Serialize};

/// Field carrying a record's SyncMarker in its local representation.
pub const SYNC_MARKER_FIELD: &str = "synced";

/// Field marking a record as deleted; such records are pushed as deletes.
pub const TOMBSTONE_FIELD: &str = "_deleted";

/// Whether a local record carries a tombstone.
#[must_use]
pub fn is_tombstone(record: &crate::value::Record) -> bool {
    matches!(record.get(TOMBSTONE_FIELD), Some(serde_json::Value::Bool(true)))
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Which step of a sync run a history row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Pull,
    Push,
    Export,
}

impl RunKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Export => "export",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    /// Some chunks committed before a failure.
    Partial,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for a finished sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_read: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    #[test]
    fn run_status_as_str() {
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert_eq!(RunStatus::Completed.as_str(), "completed");
        assert_eq!(RunStatus::Partial.as_str(), "partial");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn run_status_serde_roundtrip() {
        let json = serde_json::to_string(&RunStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let back: RunStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RunStatus::Partial);
    }

    #[test]
    fn run_stats_default_is_zeroed() {
        let stats = RunStats::default();
        assert_eq!(stats.records_read, 0);
        assert_eq!(stats.records_written, 0);
        assert_eq!(stats.records_skipped, 0);
        assert!(stats.error_message.is_none());
    }

    #[test]
    fn tombstone_requires_literal_true() {
        let mut record = Record::new();
        record.insert(TOMBSTONE_FIELD.into(), serde_json::json!("yes"));
        assert!(!is_tombstone(&record));
        record.insert(TOMBSTONE_FIELD.into(), serde_json::json!(true));
        assert!(is_tombstone(&record));
    }
}
