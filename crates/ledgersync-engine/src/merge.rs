//! Field-level diff and merge between a local record and its remote copy.
//!
//! Precedence is by store, not by timestamp: with `prefer_remote` the
//! primary store wins every field it carries. Absence of a field in the
//! remote record never deletes the local value; only an explicit remote
//! `null` clears it.

use std::collections::{BTreeMap, BTreeSet};

use ledgersync_types::state::SYNC_MARKER_FIELD;
use ledgersync_types::value::Record;
use serde_json::Value;

/// Old and new value of one differing field. `None` means absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub local: Option<Value>,
    pub remote: Option<Value>,
}

/// Fields whose values differ between two records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeDiff {
    pub changes: BTreeMap<String, FieldChange>,
}

impl MergeDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }
}

/// Merge behavior for pulled records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    pub prefer_remote: bool,
    /// Fields left out of change detection.
    pub ignore_fields: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            prefer_remote: true,
            ignore_fields: Vec::new(),
        }
    }
}

/// Field values compare by their serialized form; absent and `null` are
/// the same value since a NULL column reads back as an absent field.
fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a.filter(|v| !v.is_null()), b.filter(|v| !v.is_null())) {
        (Some(a), Some(b)) => a.to_string() == b.to_string(),
        (None, None) => true,
        _ => false,
    }
}

/// Fields of the key union of `local` and `remote` whose values differ.
#[must_use]
pub fn diff(local: &Record, remote: &Record, ignore_fields: &[String]) -> MergeDiff {
    let keys: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
    let changes = keys
        .into_iter()
        .filter(|k| !ignore_fields.iter().any(|f| f == *k))
        .filter_map(|k| {
            let (l, r) = (local.get(k), remote.get(k));
            let same = same_value(l, r);
            (!same).then(|| {
                (
                    k.clone(),
                    FieldChange {
                        local: l.cloned(),
                        remote: r.cloned(),
                    },
                )
            })
        })
        .collect();
    MergeDiff { changes }
}

/// Merge `remote` into `local`.
///
/// With `prefer_remote`, every field present in `remote` overwrites the
/// local value. Otherwise local values win and remote-only fields are
/// carried through. Either way the local SyncMarker is kept as-is.
#[must_use]
pub fn merge(local: &Record, remote: &Record, prefer_remote: bool) -> Record {
    let mut merged = local.clone();
    for (field, value) in remote {
        if field == SYNC_MARKER_FIELD {
            continue;
        }
        if prefer_remote || !merged.contains_key(field) {
            merged.insert(field.clone(), value.clone());
        }
    }
    merged
}
