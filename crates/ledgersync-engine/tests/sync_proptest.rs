use chrono::{DateTime, Utc};
use ledgersync_engine::delta::{pull_remote, sync_unsynced};
use ledgersync_engine::merge::{merge, MergePolicy};
use ledgersync_engine::normalize::{to_portable, Normalizer};
use ledgersync_engine::primary::chunks;
use ledgersync_engine::query::{execute_range_query, RangeQuery};
use ledgersync_engine::{MemoryDocumentStore, Registry, WRITE_BATCH_LIMIT};
use ledgersync_state::{LocalStore, SqliteLocalStore};
use ledgersync_types::entity::EntityType;
use ledgersync_types::query::{Direction, EqualityFilter, OrderBy, RangeFilter};
use ledgersync_types::schema::EntitySchema;
use ledgersync_types::value::{Fields, NativeValue, Record};
use proptest::prelude::*;
use serde_json::{json, Value};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("test runtime")
}

fn small_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|i| json!(i)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

fn small_record() -> impl Strategy<Value = Record> {
    prop::collection::btree_map("[a-e]", small_value(), 0..5)
        .prop_map(|m| m.into_iter().collect::<Record>())
}

proptest! {
    #[test]
    fn chunks_are_bounded_and_preserve_order(len in 0_usize..2_600) {
        let items: Vec<usize> = (0..len).collect();
        let mut rejoined = Vec::with_capacity(len);
        for chunk in chunks(&items) {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.len() <= WRITE_BATCH_LIMIT);
            prop_assert_eq!(chunk.offset(), rejoined.len());
            rejoined.extend_from_slice(chunk.items());
        }
        prop_assert_eq!(rejoined, items);
    }

    #[test]
    fn timestamps_survive_portable_round_trip(
        secs in -2_000_000_000_i64..4_000_000_000,
        nanos in 0_u32..1_000_000_000,
    ) {
        let ts = DateTime::<Utc>::from_timestamp(secs, nanos).expect("in range");
        let schema = EntitySchema::new();
        let normalizer = Normalizer::new(&schema);
        let portable = to_portable(&NativeValue::Timestamp(ts));
        prop_assert_eq!(normalizer.to_native(&portable, "createdAt"), NativeValue::Timestamp(ts));
    }

    #[test]
    fn remote_wins_every_field_it_carries(local in small_record(), remote in small_record()) {
        let merged = merge(&local, &remote, true);
        for (field, value) in &remote {
            prop_assert_eq!(&merged[field], value);
        }
        for (field, value) in &local {
            if !remote.contains_key(field) {
                prop_assert_eq!(&merged[field], value);
            }
        }
    }

    #[test]
    fn fallback_returns_composite_result(
        docs in prop::collection::vec((0_u8..3, prop::option::of(0_i64..30)), 0..40),
        low in 0_i64..30,
        span in 0_i64..15,
        user in 0_u8..3,
        descending in any::<bool>(),
        limit in prop::option::of(1_usize..10),
    ) {
        let build = |with_index: bool| {
            let store = MemoryDocumentStore::new("prop");
            for (i, (u, day)) in docs.iter().enumerate() {
                let mut fields = Fields::new();
                fields.insert("userId".into(), NativeValue::String(format!("u{u}")));
                if let Some(day) = day {
                    fields.insert("day".into(), NativeValue::Integer(*day));
                }
                store.put("transactions", &format!("t{i:03}"), fields);
            }
            if with_index {
                store.add_index("transactions", &["userId", "day"]);
            }
            store
        };

        let mut query = RangeQuery::new(
            EntityType::Transaction,
            RangeFilter::between("day", NativeValue::Integer(low), NativeValue::Integer(low + span)),
        );
        query.equals.push(EqualityFilter {
            field: "userId".into(),
            value: NativeValue::String(format!("u{user}")),
        });
        query.order_by = Some(OrderBy {
            field: "day".into(),
            direction: if descending { Direction::Descending } else { Direction::Ascending },
        });
        query.limit = limit;

        let registry = Registry::builtin();
        let rt = runtime();
        let indexed = rt.block_on(execute_range_query(&build(true), &registry, &query)).unwrap();
        let fallback = rt.block_on(execute_range_query(&build(false), &registry, &query)).unwrap();
        prop_assert_eq!(indexed.records, fallback.records);
        prop_assert!(indexed.remediation.is_none());
        prop_assert!(fallback.remediation.is_some());
    }

    #[test]
    fn synced_markers_never_revert(
        count in 1_usize..20,
        renamed in prop::collection::vec(any::<bool>(), 20),
        prefer_remote in any::<bool>(),
    ) {
        let store = MemoryDocumentStore::default();
        let local = SqliteLocalStore::in_memory().unwrap();
        let registry = Registry::builtin();
        let spec = registry.table_spec(EntityType::Account);
        local.ensure_table(&spec).unwrap();
        for i in 0..count {
            let record = json!({"id": format!("a{i}"), "name": format!("acct {i}")});
            local.insert(&spec, record.as_object().unwrap()).unwrap();
        }

        let rt = runtime();
        rt.block_on(sync_unsynced(&store, &local, &registry, EntityType::Account)).unwrap();

        for i in (0..count).filter(|i| renamed[*i]) {
            let mut fields = Fields::new();
            fields.insert("name".into(), NativeValue::String(format!("remote {i}")));
            store.put("accounts", &format!("a{i}"), fields);
        }
        store.put("accounts", "new-remote", Fields::new());

        let policy = MergePolicy { prefer_remote, ..MergePolicy::default() };
        rt.block_on(pull_remote(&store, &local, &registry, EntityType::Account, &policy)).unwrap();

        for i in 0..count {
            let row = local.get(&spec, &format!("a{i}")).unwrap().unwrap();
            prop_assert_eq!(&row["synced"], &json!(true));
        }
        let fresh = local.get(&spec, "new-remote").unwrap().unwrap();
        prop_assert_eq!(&fresh["synced"], &json!(true));
    }
}
