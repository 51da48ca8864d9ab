//! Table layout for entity tables and record/row conversion.
//!
//! Every entity table has the same shape:
//!
//! | column            | contents                                        |
//! |-------------------|-------------------------------------------------|
//! | `<primary key>`   | `TEXT PRIMARY KEY`                              |
//! | declared fields   | one column per declared field                   |
//! | `_extra`          | JSON object of every undeclared field           |
//! | `synced`          | SyncMarker; `NULL` and `0` both read as false   |

use ledgersync_types::schema::{EntitySchema, FieldType};
use ledgersync_types::state::SYNC_MARKER_FIELD;
use ledgersync_types::value::{record_key, Record};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::error::{self, StateError};

/// Column holding undeclared fields as a JSON object.
pub const EXTRA_COLUMN: &str = "_extra";

/// Physical description of one entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table: String,
    pub primary_key: String,
    /// Declared columns, excluding the primary key and reserved columns.
    pub columns: Vec<(String, FieldType)>,
}

impl TableSpec {
    /// Build a table layout from an entity's declared schema.
    #[must_use]
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>, schema: &EntitySchema) -> Self {
        let primary_key = primary_key.into();
        let columns = schema
            .fields
            .iter()
            .filter(|(name, _)| {
                name.as_str() != primary_key
                    && name.as_str() != SYNC_MARKER_FIELD
                    && name.as_str() != EXTRA_COLUMN
            })
            .map(|(name, ty)| (name.clone(), *ty))
            .collect();
        Self {
            table: table.into(),
            primary_key,
            columns,
        }
    }

    fn declared(&self, field: &str) -> Option<FieldType> {
        self.columns
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, ty)| *ty)
    }

    /// Idempotent DDL for this table.
    #[must_use]
    pub fn create_sql(&self) -> String {
        let mut cols = vec![format!(
            "{} TEXT PRIMARY KEY NOT NULL",
            quote_ident(&self.primary_key)
        )];
        for (name, ty) in &self.columns {
            cols.push(column_def(name, *ty));
        }
        cols.push(format!("{} TEXT", quote_ident(EXTRA_COLUMN)));
        cols.push(format!("{} INTEGER DEFAULT 0", quote_ident(SYNC_MARKER_FIELD)));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.table),
            cols.join(",\n    ")
        )
    }

    /// Column names written by [`TableSpec::to_row`], in order.
    #[must_use]
    pub fn data_columns(&self) -> Vec<&str> {
        let mut names = vec![self.primary_key.as_str()];
        names.extend(self.columns.iter().map(|(n, _)| n.as_str()));
        names.push(EXTRA_COLUMN);
        names
    }

    /// Split a record into the key and the values of [`TableSpec::data_columns`].
    ///
    /// The SyncMarker field is never part of the row; callers manage it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::MissingKey`] if the record has no usable key,
    /// or [`StateError::Json`] if a nested value cannot be encoded.
    pub fn to_row(&self, record: &Record) -> error::Result<(String, Vec<SqlValue>)> {
        let key = record_key(record, &self.primary_key).ok_or_else(|| StateError::MissingKey {
            table: self.table.clone(),
            primary_key: self.primary_key.clone(),
        })?;

        let mut values = vec![SqlValue::Text(key.clone())];
        for (name, _) in &self.columns {
            values.push(match record.get(name) {
                Some(v) => json_to_sql(v)?,
                None => SqlValue::Null,
            });
        }

        let extra: serde_json::Map<String, Value> = record
            .iter()
            .filter(|(k, _)| {
                k.as_str() != self.primary_key
                    && k.as_str() != SYNC_MARKER_FIELD
                    && self.declared(k).is_none()
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        values.push(if extra.is_empty() {
            SqlValue::Null
        } else {
            SqlValue::Text(serde_json::to_string(&extra)?)
        });

        Ok((key, values))
    }

    /// Rebuild a record from a row read as `data_columns() + synced`.
    ///
    /// `NULL` columns are omitted from the record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Json`] if the extra column holds invalid JSON.
    pub fn from_row(&self, row: Vec<SqlValue>) -> error::Result<Record> {
        let mut record = Record::new();
        let mut cells = row.into_iter();

        if let Some(SqlValue::Text(key)) = cells.next() {
            record.insert(self.primary_key.clone(), Value::String(key));
        }
        for (name, ty) in &self.columns {
            let cell = cells.next().unwrap_or(SqlValue::Null);
            if let Some(v) = sql_to_json(cell, *ty) {
                record.insert(name.clone(), v);
            }
        }
        if let Some(SqlValue::Text(extra)) = cells.next() {
            let extra: serde_json::Map<String, Value> = serde_json::from_str(&extra)?;
            for (k, v) in extra {
                record.entry(k).or_insert(v);
            }
        }
        let synced = matches!(cells.next(), Some(SqlValue::Integer(n)) if n != 0);
        record.insert(SYNC_MARKER_FIELD.to_string(), Value::Bool(synced));
        Ok(record)
    }
}

/// Column definition for a declared field; untyped for numbers.
#[must_use]
pub fn column_def(name: &str, ty: FieldType) -> String {
    match ty.sql_type() {
        "" => quote_ident(name),
        sql_type => format!("{} {sql_type}", quote_ident(name)),
    }
}

/// Quote an SQL identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn json_to_sql(value: &Value) -> error::Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(serde_json::to_string(value)?),
    })
}

fn sql_to_json(cell: SqlValue, ty: FieldType) -> Option<Value> {
    match (cell, ty) {
        (SqlValue::Null, _) => None,
        (SqlValue::Integer(n), FieldType::Boolean) => Some(Value::Bool(n != 0)),
        (SqlValue::Integer(n), _) => Some(Value::from(n)),
        (SqlValue::Real(f), _) => Some(serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)),
        (SqlValue::Text(s), FieldType::Json) => {
            Some(serde_json::from_str(&s).unwrap_or(Value::String(s)))
        }
        (SqlValue::Text(s), _) => Some(Value::String(s)),
        (SqlValue::Blob(b), _) => Some(Value::String(String::from_utf8_lossy(&b).into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> TableSpec {
        let schema = EntitySchema::new()
            .field("amount", FieldType::Number)
            .field("cleared", FieldType::Boolean)
            .field("tags", FieldType::Json)
            .field("id", FieldType::String);
        TableSpec::new("transactions", "id", &schema)
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn primary_key_is_not_repeated_as_a_column() {
        let spec = spec();
        assert_eq!(spec.data_columns(), ["id", "amount", "cleared", "tags", "_extra"]);
        let ddl = spec.create_sql();
        assert!(ddl.contains("\"id\" TEXT PRIMARY KEY NOT NULL"));
        assert!(ddl.contains("\"synced\" INTEGER DEFAULT 0"));
        assert!(ddl.contains("\"amount\",\n"));
        assert!(ddl.contains("\"cleared\" INTEGER"));
    }

    #[test]
    fn row_round_trip_preserves_declared_and_extra_fields() {
        let spec = spec();
        let input = record(json!({
            "id": "t1",
            "amount": 12.5,
            "cleared": true,
            "tags": ["food"],
            "note": "lunch",
            "synced": true
        }));
        let (key, mut row) = spec.to_row(&input).unwrap();
        assert_eq!(key, "t1");
        row.push(SqlValue::Integer(0));

        let back = spec.from_row(row).unwrap();
        assert_eq!(back["amount"], json!(12.5));
        assert_eq!(back["cleared"], json!(true));
        assert_eq!(back["tags"], json!(["food"]));
        assert_eq!(back["note"], json!("lunch"));
        assert_eq!(back["synced"], json!(false));
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = spec().to_row(&record(json!({"amount": 1}))).unwrap_err();
        assert!(matches!(err, StateError::MissingKey { .. }));
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
