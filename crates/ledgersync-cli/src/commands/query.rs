use std::path::Path;

use anyhow::{bail, Context, Result};
use ledgersync_engine::normalize::Normalizer;
use ledgersync_engine::query::{execute_range_query, RangeQuery};
use ledgersync_types::entity::EntityType;
use ledgersync_types::query::{Bound, Direction, EqualityFilter, OrderBy, RangeFilter};
use ledgersync_types::schema::{EntitySchema, FieldType};
use ledgersync_types::value::NativeValue;
use serde_json::Value;

pub struct QueryArgs {
    pub entity: String,
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub filters: Vec<String>,
    pub order_by: Option<String>,
    pub desc: bool,
    pub limit: Option<usize>,
}

/// Command-line value to native. Fields declared as text or timestamps keep
/// the raw text; other fields read JSON literals as such and anything else
/// as a string. The field's declared type then applies.
fn native(schema: &EntitySchema, field: &str, raw: &str) -> NativeValue {
    let value = match schema.field_type(field) {
        Some(FieldType::String | FieldType::Timestamp) => Value::String(raw.to_string()),
        _ => serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    };
    Normalizer::new(schema).to_native(&value, field)
}

/// Execute the `query` command.
pub async fn execute(config_path: &Path, args: &QueryArgs) -> Result<()> {
    let loaded = super::load(config_path)?;
    let entity: EntityType = args.entity.parse()?;
    let schema = loaded.registry.schema_of(entity);

    if args.from.is_none() && args.to.is_none() {
        bail!("A range query needs --from, --to, or both");
    }
    let bound = |raw: &Option<String>| {
        raw.as_deref().map(|r| Bound {
            value: native(schema, &args.field, r),
            inclusive: true,
        })
    };
    let range = RangeFilter {
        field: args.field.clone(),
        lower: bound(&args.from),
        upper: bound(&args.to),
    };

    let mut query = RangeQuery::new(entity, range);
    for filter in &args.filters {
        let (field, raw) = filter
            .split_once('=')
            .with_context(|| format!("Filter '{filter}' is not field=value"))?;
        query.equals.push(EqualityFilter {
            field: field.to_string(),
            value: native(schema, field, raw),
        });
    }
    query.order_by = args.order_by.as_ref().map(|field| OrderBy {
        field: field.clone(),
        direction: if args.desc {
            Direction::Descending
        } else {
            Direction::Ascending
        },
    });
    query.limit = args.limit;

    let store = loaded.primary()?;
    let outcome = execute_range_query(&store, &loaded.registry, &query).await?;

    for record in &outcome.records {
        println!("{}", serde_json::to_string(record)?);
    }
    eprintln!("{} record(s) via {:?} path", outcome.records.len(), outcome.path);
    if let Some(remediation) = &outcome.remediation {
        eprintln!("Hint: {}", remediation.message);
        if let Some(url) = &remediation.url {
            eprintln!("Create the index: {url}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_engine::Registry;

    #[test]
    fn text_fields_keep_numeric_looking_values_as_strings() {
        let registry = Registry::builtin();
        let schema = registry.schema_of(EntityType::Transaction);
        assert_eq!(native(schema, "userId", "123"), NativeValue::String("123".into()));
        assert_eq!(native(schema, "amount", "123"), NativeValue::Integer(123));
        assert_eq!(native(schema, "amount", "12.5"), NativeValue::Double(12.5));
        assert!(matches!(
            native(schema, "date", "2024-03-04T12:00:00Z"),
            NativeValue::Timestamp(_)
        ));
    }
}
