//! Entity registry: collection/table names, primary keys, declared schemas.
//!
//! A [`Registry`] is built once (from the built-in defaults plus any
//! configuration overrides) and passed to every component. Lookups by
//! [`EntityType`] are total; lookups by name fall back to the name itself so
//! ad-hoc collections and tables stay usable without a mapping.

use std::borrow::Cow;
use std::collections::BTreeMap;

use ledgersync_state::TableSpec;
use ledgersync_types::entity::EntityType;
use ledgersync_types::schema::{EntitySchema, FieldType};

/// How one entity type appears in both stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    pub collection: String,
    pub table: String,
    pub primary_key: String,
    pub schema: EntitySchema,
}

/// Override of one entity's built-in mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOverride {
    pub collection: Option<String>,
    pub table: Option<String>,
    pub primary_key: Option<String>,
    pub schema: Option<EntitySchema>,
}

/// Registry construction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} name '{name}' is mapped by both {first} and {second}")]
    Duplicate {
        kind: &'static str,
        name: String,
        first: EntityType,
        second: EntityType,
    },
    #[error("{entity}: {what} must not be empty")]
    Empty {
        entity: EntityType,
        what: &'static str,
    },
}

/// Bijective mapping between entity types, collections, and tables.
#[derive(Debug, Clone)]
pub struct Registry {
    mappings: BTreeMap<EntityType, EntityMapping>,
}

fn builtin_mapping(entity: EntityType) -> EntityMapping {
    use FieldType::{Boolean, Json, Number, String as Text, Timestamp};

    let (collection, table, primary_key, schema) = match entity {
        EntityType::User => (
            "users",
            "users",
            "uid",
            EntitySchema::new()
                .required("email", Text)
                .field("displayName", Text)
                .field("role", Text)
                .field("disabled", Boolean)
                .field("currency", Text)
                .field("createdAt", Timestamp)
                .field("lastLoginAt", Timestamp),
        ),
        EntityType::Account => (
            "accounts",
            "accounts",
            "id",
            EntitySchema::new()
                .required("name", Text)
                .field("userId", Text)
                .field("type", Text)
                .field("balance", Number)
                .field("currency", Text)
                .field("createdAt", Timestamp)
                .field("updatedAt", Timestamp),
        ),
        EntityType::Category => (
            "categories",
            "expense_categories",
            "id",
            EntitySchema::new()
                .required("name", Text)
                .field("userId", Text)
                .field("type", Text)
                .field("color", Text)
                .field("icon", Text)
                .field("createdAt", Timestamp)
                .field("updatedAt", Timestamp),
        ),
        EntityType::Budget => (
            "budgets",
            "budget_limits",
            "id",
            EntitySchema::new()
                .required("amount", Number)
                .field("userId", Text)
                .field("categoryId", Text)
                .field("period", Text)
                .field("startDate", Timestamp)
                .field("endDate", Timestamp)
                .field("createdAt", Timestamp)
                .field("updatedAt", Timestamp),
        ),
        EntityType::Transaction => (
            "transactions",
            "transactions",
            "id",
            EntitySchema::new()
                .required("amount", Number)
                .required("userId", Text)
                .field("accountId", Text)
                .field("categoryId", Text)
                .field("type", Text)
                .field("description", Text)
                .field("tags", Json)
                .field("date", Timestamp)
                .field("createdAt", Timestamp)
                .field("updatedAt", Timestamp),
        ),
    };

    EntityMapping {
        collection: collection.to_string(),
        table: table.to_string(),
        primary_key: primary_key.to_string(),
        schema,
    }
}

impl Registry {
    /// Registry with the built-in mapping for every entity type.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            mappings: EntityType::ALL
                .into_iter()
                .map(|e| (e, builtin_mapping(e)))
                .collect(),
        }
    }

    /// Built-in registry with `overrides` applied.
    ///
    /// Declared fields in an override schema are layered over the built-in
    /// ones rather than replacing them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the result is not a bijection or any
    /// name is empty.
    pub fn with_overrides(
        overrides: &BTreeMap<EntityType, MappingOverride>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        for (entity, o) in overrides {
            let Some(mapping) = registry.mappings.get_mut(entity) else {
                continue;
            };
            if let Some(collection) = &o.collection {
                mapping.collection.clone_from(collection);
            }
            if let Some(table) = &o.table {
                mapping.table.clone_from(table);
            }
            if let Some(pk) = &o.primary_key {
                mapping.primary_key.clone_from(pk);
            }
            if let Some(schema) = &o.schema {
                mapping.schema.extend(schema);
            }
        }
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let mut collections: BTreeMap<&str, EntityType> = BTreeMap::new();
        let mut tables: BTreeMap<&str, EntityType> = BTreeMap::new();

        for (entity, m) in &self.mappings {
            for (what, value) in [
                ("collection", &m.collection),
                ("table", &m.table),
                ("primary key", &m.primary_key),
            ] {
                if value.trim().is_empty() {
                    return Err(RegistryError::Empty {
                        entity: *entity,
                        what,
                    });
                }
            }
            if let Some(first) = collections.insert(&m.collection, *entity) {
                return Err(RegistryError::Duplicate {
                    kind: "collection",
                    name: m.collection.clone(),
                    first,
                    second: *entity,
                });
            }
            if let Some(first) = tables.insert(&m.table, *entity) {
                return Err(RegistryError::Duplicate {
                    kind: "table",
                    name: m.table.clone(),
                    first,
                    second: *entity,
                });
            }
        }
        Ok(())
    }

    fn mapping(&self, entity: EntityType) -> &EntityMapping {
        // Every constructor populates all of `EntityType::ALL`.
        &self.mappings[&entity]
    }

    /// Table name for an entity type.
    #[must_use]
    pub fn table_name_of(&self, entity: EntityType) -> &str {
        &self.mapping(entity).table
    }

    /// Collection name for an entity type.
    #[must_use]
    pub fn collection_of(&self, entity: EntityType) -> &str {
        &self.mapping(entity).collection
    }

    /// Field serving as the entity's natural primary key.
    #[must_use]
    pub fn primary_key_of(&self, entity: EntityType) -> &str {
        &self.mapping(entity).primary_key
    }

    /// Declared schema of an entity type.
    #[must_use]
    pub fn schema_of(&self, entity: EntityType) -> &EntitySchema {
        &self.mapping(entity).schema
    }

    /// Entity type stored in `table`, if mapped.
    #[must_use]
    pub fn entity_for_table(&self, table: &str) -> Option<EntityType> {
        self.mappings
            .iter()
            .find(|(_, m)| m.table == table)
            .map(|(e, _)| *e)
    }

    /// Entity type stored in `collection`, if mapped.
    #[must_use]
    pub fn entity_for_collection(&self, collection: &str) -> Option<EntityType> {
        self.mappings
            .iter()
            .find(|(_, m)| m.collection == collection)
            .map(|(e, _)| *e)
    }

    /// Collection backing `table`; unmapped tables map to themselves.
    #[must_use]
    pub fn collection_name_of<'a>(&'a self, table: &'a str) -> Cow<'a, str> {
        match self.entity_for_table(table) {
            Some(entity) => Cow::Borrowed(self.collection_of(entity)),
            None => Cow::Borrowed(table),
        }
    }

    /// Table backing `collection`; unmapped collections map to themselves.
    #[must_use]
    pub fn table_name_for_collection<'a>(&'a self, collection: &'a str) -> Cow<'a, str> {
        match self.entity_for_collection(collection) {
            Some(entity) => Cow::Borrowed(self.table_name_of(entity)),
            None => Cow::Borrowed(collection),
        }
    }

    /// Physical layout of the entity's local table.
    #[must_use]
    pub fn table_spec(&self, entity: EntityType) -> TableSpec {
        let m = self.mapping(entity);
        TableSpec::new(m.table.clone(), m.primary_key.clone(), &m.schema)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
