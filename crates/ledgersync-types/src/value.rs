//! Primary-store native values, documents, and portable records.
//!
//! A [`Document`] is what the primary store hands out: an identifier plus a
//! map of [`NativeValue`]s, which may contain the store's own timestamp type.
//! A [`Record`] is the portable, table-ready form: plain JSON values with
//! timestamps rendered as ISO-8601 strings.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portable record: field name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Field map of a native document.
pub type Fields = BTreeMap<String, NativeValue>;

/// A value as stored by the primary (document) store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NativeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<NativeValue>),
    Map(Fields),
}

impl NativeValue {
    /// Cross-type ordering rank, lowest first.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
            Self::Array(_) => 5,
            Self::Map(_) => 6,
        }
    }

    /// Total order used for sorting query results.
    ///
    /// Values of different types order by type rank; numbers compare
    /// numerically regardless of integer/double representation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(a), Self::Double(b)) => (*a as f64).total_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Map(a), Self::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b) {
                    let ord = ka.cmp(kb).then_with(|| va.sort_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality as the primary store evaluates an `==` filter.
    #[must_use]
    pub fn filter_eq(&self, other: &Self) -> bool {
        self.type_rank() == other.type_rank() && self.sort_cmp(other) == Ordering::Equal
    }

    /// Whether two values are comparable by a range filter.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        self.type_rank() == other.type_rank()
    }

    /// String contents if this is a non-empty string or a number.
    ///
    /// Used when a field doubles as a storage identifier.
    #[must_use]
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

/// A document as returned by the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-generated (or caller-assigned) document identifier.
    pub id: String,
    pub fields: Fields,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&NativeValue> {
        self.fields.get(field)
    }
}

/// Read a record's value as a storage key.
///
/// Returns `None` for absent, null, empty-string, or non-scalar values.
#[must_use]
pub fn record_key(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn numbers_compare_across_representations() {
        let a = NativeValue::Integer(2);
        let b = NativeValue::Double(2.5);
        assert_eq!(a.sort_cmp(&b), Ordering::Less);
        assert!(NativeValue::Integer(3).filter_eq(&NativeValue::Double(3.0)));
    }

    #[test]
    fn mixed_types_order_by_rank() {
        let ts = NativeValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let s = NativeValue::String("2023".into());
        assert_eq!(ts.sort_cmp(&s), Ordering::Less);
        assert!(!ts.filter_eq(&s));
    }

    #[test]
    fn as_key_rejects_blank_strings() {
        assert_eq!(NativeValue::String("  ".into()).as_key(), None);
        assert_eq!(NativeValue::String("u1".into()).as_key(), Some("u1".into()));
        assert_eq!(NativeValue::Integer(7).as_key(), Some("7".into()));
        assert_eq!(NativeValue::Null.as_key(), None);
    }

    #[test]
    fn record_key_reads_strings_and_numbers() {
        let mut record = Record::new();
        record.insert("id".into(), serde_json::json!("t-1"));
        record.insert("num".into(), serde_json::json!(42));
        record.insert("blank".into(), serde_json::json!(""));
        assert_eq!(record_key(&record, "id").as_deref(), Some("t-1"));
        assert_eq!(record_key(&record, "num").as_deref(), Some("42"));
        assert_eq!(record_key(&record, "blank"), None);
        assert_eq!(record_key(&record, "missing"), None);
    }

    #[test]
    fn native_value_serde_is_tagged() {
        let json = serde_json::to_value(NativeValue::Integer(5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "integer", "value": 5}));
        let back: NativeValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, NativeValue::Integer(5));
    }
}
