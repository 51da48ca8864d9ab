//! Declared per-entity field schemas.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Timestamp,
    /// Nested structure (map or list), stored JSON-encoded in tables.
    Json,
}

impl FieldType {
    /// Declared column type in the tabular store.
    ///
    /// Numbers get no declared type, so SQLite stores integers and floats
    /// exactly as bound instead of coercing one into the other.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::String | Self::Timestamp | Self::Json => "TEXT",
            Self::Number => "",
            Self::Boolean => "INTEGER",
        }
    }
}

/// Field declarations for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Declared fields and their types.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
    /// Fields that must be present (and non-null) before a record is pushed.
    #[serde(default)]
    pub required: BTreeSet<String>,
    /// Fall back to the field-name heuristic for undeclared fields.
    #[serde(default = "default_infer_timestamps")]
    pub infer_timestamps: bool,
}

fn default_infer_timestamps() -> bool {
    true
}

impl EntitySchema {
    /// Start an empty schema that still infers timestamps by field name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            required: BTreeSet::new(),
            infer_timestamps: true,
        }
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(name.to_string(), ty);
        self
    }

    /// Declare a required field.
    #[must_use]
    pub fn required(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(name.to_string(), ty);
        self.required.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Overlay `other` on top of `self`; declarations in `other` win.
    pub fn extend(&mut self, other: &EntitySchema) {
        self.fields
            .extend(other.fields.iter().map(|(k, v)| (k.clone(), *v)));
        self.required.extend(other.required.iter().cloned());
        self.infer_timestamps = other.infer_timestamps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_required_fields() {
        let schema = EntitySchema::new()
            .required("amount", FieldType::Number)
            .field("note", FieldType::String);
        assert_eq!(schema.field_type("amount"), Some(FieldType::Number));
        assert!(schema.required.contains("amount"));
        assert!(!schema.required.contains("note"));
    }

    #[test]
    fn deserialize_defaults_to_inference() {
        let schema: EntitySchema = serde_json::from_str(r#"{"fields":{"date":"timestamp"}}"#).unwrap();
        assert!(schema.infer_timestamps);
        assert_eq!(schema.field_type("date"), Some(FieldType::Timestamp));
    }

    #[test]
    fn extend_overrides_declarations() {
        let mut base = EntitySchema::new().field("date", FieldType::String);
        let mut overlay = EntitySchema::new().field("date", FieldType::Timestamp);
        overlay.infer_timestamps = false;
        base.extend(&overlay);
        assert_eq!(base.field_type("date"), Some(FieldType::Timestamp));
        assert!(!base.infer_timestamps);
    }
}
