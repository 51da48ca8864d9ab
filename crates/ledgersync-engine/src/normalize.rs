//! Conversion between primary-store native values and portable records.
//!
//! Timestamps leave the primary store as ISO-8601 strings and are parsed
//! back on the way in. Which string fields are parsed is decided by the
//! entity's declared schema; only fields the schema does not declare fall
//! back to the name heuristic, and only when the schema allows inference.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use ledgersync_types::entity::EntityType;
use ledgersync_types::schema::{EntitySchema, FieldType};
use ledgersync_types::value::{Document, Fields, NativeValue, Record};
use serde_json::Value;

use crate::registry::Registry;

/// Convert a native value to its portable form.
///
/// Timestamps become RFC 3339 strings in UTC with a `Z` suffix and as many
/// fractional digits as needed; everything else passes through. Non-finite
/// doubles have no JSON form and become `null`.
#[must_use]
pub fn to_portable(value: &NativeValue) -> Value {
    match value {
        NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Bool(*b),
        NativeValue::Integer(i) => Value::from(*i),
        NativeValue::Double(d) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),
        NativeValue::String(s) => Value::String(s.clone()),
        NativeValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        NativeValue::Array(items) => Value::Array(items.iter().map(to_portable).collect()),
        NativeValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_portable(v)))
                .collect(),
        ),
    }
}

/// Field-name heuristic for undeclared timestamp fields.
#[must_use]
pub fn looks_like_timestamp(field: &str) -> bool {
    field.contains("At") || field.contains("Time") || field == "date"
}

/// Parse an ISO-8601 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Convert a portable value without any timestamp interpretation.
fn plain_native(value: &Value) -> NativeValue {
    match value {
        Value::Null => NativeValue::Null,
        Value::Bool(b) => NativeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => NativeValue::Integer(i),
            None => NativeValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => NativeValue::String(s.clone()),
        Value::Array(items) => NativeValue::Array(items.iter().map(plain_native).collect()),
        Value::Object(map) => NativeValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), plain_native(v)))
                .collect(),
        ),
    }
}

/// Schema-driven normalizer for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    schema: &'a EntitySchema,
}

impl<'a> Normalizer<'a> {
    #[must_use]
    pub fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    #[must_use]
    pub fn for_entity(registry: &'a Registry, entity: EntityType) -> Self {
        Self::new(registry.schema_of(entity))
    }

    /// Whether string values of `field` are parsed as timestamps.
    #[must_use]
    pub fn is_timestamp_field(&self, field: &str) -> bool {
        match self.schema.field_type(field) {
            Some(ty) => ty == FieldType::Timestamp,
            None => self.schema.infer_timestamps && looks_like_timestamp(field),
        }
    }

    /// Convert a portable value of `field` to its native form.
    ///
    /// A string in a timestamp field that fails to parse stays a string;
    /// callers must tolerate unconverted timestamp-like strings.
    #[must_use]
    pub fn to_native(&self, value: &Value, field: &str) -> NativeValue {
        match value {
            Value::String(s) if self.is_timestamp_field(field) => match parse_timestamp(s) {
                Some(ts) => NativeValue::Timestamp(ts),
                None => {
                    tracing::debug!(field, value = %s, "Timestamp field did not parse, keeping string");
                    NativeValue::String(s.clone())
                }
            },
            other => plain_native(other),
        }
    }

    /// Portable record for a document, with the primary key back-filled.
    ///
    /// The declared key field wins when it holds a usable value; otherwise
    /// the document identifier is used.
    #[must_use]
    pub fn document_to_record(&self, doc: &Document, primary_key: &str) -> Record {
        let mut record: Record = doc
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), to_portable(v)))
            .collect();
        let has_key = doc
            .get(primary_key)
            .and_then(NativeValue::as_key)
            .is_some();
        if !has_key {
            record.insert(primary_key.to_string(), Value::String(doc.id.clone()));
        }
        record
    }

    /// Native field map for a record, leaving out the `skip` fields.
    #[must_use]
    pub fn record_to_fields(&self, record: &Record, skip: &[&str]) -> Fields {
        record
            .iter()
            .filter(|(k, _)| !skip.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), self.to_native(v, k)))
            .collect()
    }
}
