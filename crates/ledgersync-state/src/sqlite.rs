//! `SQLite`-backed implementation of [`LocalStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use ledgersync_types::state::{RunKind, RunStats, RunStatus, SYNC_MARKER_FIELD};
use ledgersync_types::value::Record;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

use crate::backend::{LocalStore, RunRecord};
use crate::error::{self, StateError};
use crate::schema::{column_def, quote_ident, TableSpec};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for the run history table.
const CREATE_RUNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    records_read INTEGER DEFAULT 0,
    records_written INTEGER DEFAULT 0,
    records_skipped INTEGER DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_runs_entity ON sync_runs (entity, id);
";

/// `SQLite`-backed secondary store.
///
/// Create with [`SqliteLocalStore::open`] for file-backed persistence
/// or [`SqliteLocalStore::in_memory`] for tests.
pub struct SqliteLocalStore {
    conn: Mutex<Connection>,
}

impl SqliteLocalStore {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or a `SQLite` error if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| StateError::context("open", e))?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns a `SQLite` error if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::context("open", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_RUNS_TABLE)
            .map_err(|e| StateError::context("create sync_runs", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    fn select_sql(spec: &TableSpec, filter: &str) -> String {
        let mut cols: Vec<String> = spec.data_columns().into_iter().map(quote_ident).collect();
        cols.push(quote_ident(SYNC_MARKER_FIELD));
        format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            cols.join(", "),
            quote_ident(&spec.table),
            filter,
            quote_ident(&spec.primary_key)
        )
    }

    fn query_records(
        conn: &Connection,
        spec: &TableSpec,
        sql: &str,
        params: &[SqlValue],
    ) -> error::Result<Vec<Record>> {
        let width = spec.data_columns().len() + 1;
        let mut stmt = conn.prepare(sql).map_err(|e| StateError::context("select: prepare", e))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| StateError::context("select: query", e))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| StateError::context("select: read row", e))?;
            records.push(spec.from_row(row)?);
        }
        Ok(records)
    }

    fn existing_columns(conn: &Connection, table: &str) -> error::Result<Vec<String>> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(|e| StateError::context("ensure_table: table_info", e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| StateError::context("ensure_table: table_info", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StateError::context("ensure_table: table_info", e))?;
        Ok(names)
    }

    #[cfg(test)]
    fn get_run_row(&self, run_id: i64) -> error::Result<(String, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT status, records_written, finished_at, error_message FROM sync_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(StateError::from)
    }

    #[cfg(test)]
    fn set_marker_null(&self, spec: &TableSpec, key: &str) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "UPDATE {} SET {} = NULL WHERE {} = ?1",
                quote_ident(&spec.table),
                quote_ident(SYNC_MARKER_FIELD),
                quote_ident(&spec.primary_key)
            ),
            [key],
        )?;
        Ok(())
    }
}

impl LocalStore for SqliteLocalStore {
    fn ensure_table(&self, spec: &TableSpec) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(&spec.create_sql())
            .map_err(|e| StateError::context("ensure_table: create", e))?;

        let existing = Self::existing_columns(&conn, &spec.table)?;
        for (name, ty) in &spec.columns {
            if !existing.iter().any(|c| c == name) {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    quote_ident(&spec.table),
                    column_def(name, *ty)
                ))
                .map_err(|e| StateError::context("ensure_table: add column", e))?;
            }
        }
        Ok(())
    }

    fn insert(&self, spec: &TableSpec, record: &Record) -> error::Result<()> {
        let (_, values) = spec.to_row(record)?;
        let columns = spec.data_columns();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, 0)",
            quote_ident(&spec.table),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(SYNC_MARKER_FIELD),
            placeholders.join(", ")
        );
        let conn = self.lock_conn()?;
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| StateError::context("insert", e))?;
        Ok(())
    }

    fn get(&self, spec: &TableSpec, key: &str) -> error::Result<Option<Record>> {
        let conn = self.lock_conn()?;
        let sql = Self::select_sql(
            spec,
            &format!(" WHERE {} = ?1", quote_ident(&spec.primary_key)),
        );
        let mut records =
            Self::query_records(&conn, spec, &sql, &[SqlValue::Text(key.to_string())])?;
        Ok(records.pop())
    }

    fn all(&self, spec: &TableSpec) -> error::Result<Vec<Record>> {
        let conn = self.lock_conn()?;
        let sql = Self::select_sql(spec, "");
        Self::query_records(&conn, spec, &sql, &[])
    }

    fn unsynced(&self, spec: &TableSpec) -> error::Result<Vec<Record>> {
        let conn = self.lock_conn()?;
        let marker = quote_ident(SYNC_MARKER_FIELD);
        let sql = Self::select_sql(spec, &format!(" WHERE {marker} IS NULL OR {marker} = 0"));
        Self::query_records(&conn, spec, &sql, &[])
    }

    fn mark_synced(&self, spec: &TableSpec, keys: &[String]) -> error::Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::context("mark_synced: begin tx", e))?;
        let mut stmt = tx
            .prepare(&format!(
                "UPDATE {} SET {} = 1 WHERE {} = ?1",
                quote_ident(&spec.table),
                quote_ident(SYNC_MARKER_FIELD),
                quote_ident(&spec.primary_key)
            ))
            .map_err(|e| StateError::context("mark_synced: prepare", e))?;

        let mut updated = 0usize;
        for key in keys {
            updated += stmt
                .execute([key])
                .map_err(|e| StateError::context("mark_synced: execute", e))?;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::context("mark_synced: commit", e))?;

        Ok(updated)
    }

    fn apply_merged(&self, spec: &TableSpec, records: &[Record]) -> error::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let columns = spec.data_columns();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = columns
            .iter()
            .skip(1)
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, 1) ON CONFLICT({}) DO UPDATE SET {}",
            quote_ident(&spec.table),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(SYNC_MARKER_FIELD),
            placeholders.join(", "),
            quote_ident(&spec.primary_key),
            updates.join(", ")
        );

        let rows = records
            .iter()
            .map(|r| spec.to_row(r).map(|(_, values)| values))
            .collect::<error::Result<Vec<_>>>()?;

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::context("apply_merged: begin tx", e))?;
        let mut stmt = tx
            .prepare(&sql)
            .map_err(|e| StateError::context("apply_merged: prepare", e))?;
        let mut written = 0usize;
        for values in &rows {
            written += stmt
                .execute(params_from_iter(values.iter()))
                .map_err(|e| StateError::context("apply_merged: execute", e))?;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::context("apply_merged: commit", e))?;

        Ok(written)
    }

    fn start_run(&self, entity: &str, kind: RunKind) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO sync_runs (entity, kind, status) VALUES (?1, ?2, ?3)",
            rusqlite::params![entity, kind.as_str(), RunStatus::Running.as_str()],
        )
        .map_err(|e| StateError::context("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = datetime('now'), \
             records_read = ?2, records_written = ?3, records_skipped = ?4, error_message = ?5 \
             WHERE id = ?6",
            rusqlite::params![
                status.as_str(),
                stats.records_read as i64,
                stats.records_written as i64,
                stats.records_skipped as i64,
                stats.error_message,
                run_id,
            ],
        )
        .map_err(|e| StateError::context("complete_run", e))?;
        Ok(())
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn recent_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, entity, kind, status, started_at, finished_at, \
                 records_read, records_written, records_skipped, error_message \
                 FROM sync_runs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| StateError::context("recent_runs: prepare", e))?;
        let runs = stmt
            .query_map([limit as i64], |row| {
                let started_at: String = row.get(4)?;
                let finished_at: Option<String> = row.get(5)?;
                Ok(RunRecord {
                    id: row.get(0)?,
                    entity: row.get(1)?,
                    kind: row.get(2)?,
                    status: row.get(3)?,
                    started_at: Self::sqlite_to_iso8601(&started_at),
                    finished_at: finished_at.as_deref().map(Self::sqlite_to_iso8601),
                    stats: RunStats {
                        records_read: row.get::<_, i64>(6)? as u64,
                        records_written: row.get::<_, i64>(7)? as u64,
                        records_skipped: row.get::<_, i64>(8)? as u64,
                        error_message: row.get(9)?,
                    },
                })
            })
            .map_err(|e| StateError::context("recent_runs: query", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StateError::context("recent_runs: read row", e))?;
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_types::schema::{EntitySchema, FieldType};
    use serde_json::json;

    fn spec() -> TableSpec {
        let schema = EntitySchema::new()
            .field("amount", FieldType::Number)
            .field("date", FieldType::Timestamp);
        TableSpec::new("transactions", "id", &schema)
    }

    fn store() -> SqliteLocalStore {
        let store = SqliteLocalStore::in_memory().unwrap();
        store.ensure_table(&spec()).unwrap();
        store
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_starts_unsynced() {
        let store = store();
        store
            .insert(&spec(), &record(json!({"id": "t1", "amount": 5, "synced": true})))
            .unwrap();
        let got = store.get(&spec(), "t1").unwrap().unwrap();
        assert_eq!(got["synced"], json!(false));
        assert_eq!(store.unsynced(&spec()).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_insert_fails() {
        let store = store();
        let r = record(json!({"id": "t1"}));
        store.insert(&spec(), &r).unwrap();
        assert!(store.insert(&spec(), &r).is_err());
    }

    #[test]
    fn null_marker_counts_as_unsynced() {
        let store = store();
        store.insert(&spec(), &record(json!({"id": "t1"}))).unwrap();
        store.set_marker_null(&spec(), "t1").unwrap();
        let unsynced = store.unsynced(&spec()).unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0]["synced"], json!(false));
    }

    #[test]
    fn mark_synced_flips_only_named_rows() {
        let store = store();
        for id in ["a", "b", "c"] {
            store.insert(&spec(), &record(json!({ "id": id }))).unwrap();
        }
        let updated = store
            .mark_synced(&spec(), &["a".to_string(), "c".to_string(), "zzz".to_string()])
            .unwrap();
        assert_eq!(updated, 2);

        let unsynced: Vec<_> = store
            .unsynced(&spec())
            .unwrap()
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(unsynced, vec![json!("b")]);
    }

    #[test]
    fn apply_merged_preserves_existing_markers() {
        let store = store();
        store.insert(&spec(), &record(json!({"id": "a", "amount": 1}))).unwrap();
        store.insert(&spec(), &record(json!({"id": "c", "amount": 5}))).unwrap();
        store.mark_synced(&spec(), &["a".to_string()]).unwrap();

        let merged = vec![
            record(json!({"id": "a", "amount": 2, "synced": false})),
            record(json!({"id": "b", "amount": 3, "synced": false})),
            record(json!({"id": "c", "amount": 6, "synced": true})),
        ];
        assert_eq!(store.apply_merged(&spec(), &merged).unwrap(), 3);

        let a = store.get(&spec(), "a").unwrap().unwrap();
        assert_eq!(a["amount"], json!(2));
        assert_eq!(a["synced"], json!(true));
        let b = store.get(&spec(), "b").unwrap().unwrap();
        assert_eq!(b["synced"], json!(true));
        let c = store.get(&spec(), "c").unwrap().unwrap();
        assert_eq!(c["amount"], json!(6));
        assert_eq!(c["synced"], json!(false));
    }

    #[test]
    fn numbers_keep_integer_and_float_storage() {
        let store = store();
        store
            .insert(&spec(), &record(json!({"id": "i", "amount": 100})))
            .unwrap();
        store
            .insert(&spec(), &record(json!({"id": "f", "amount": 2.0})))
            .unwrap();
        assert_eq!(store.get(&spec(), "i").unwrap().unwrap()["amount"].to_string(), "100");
        assert_eq!(store.get(&spec(), "f").unwrap().unwrap()["amount"].to_string(), "2.0");
    }

    #[test]
    fn apply_merged_is_all_or_nothing() {
        let store = store();
        let merged = vec![record(json!({"id": "a"})), record(json!({"amount": 1}))];
        assert!(store.apply_merged(&spec(), &merged).is_err());
        assert!(store.all(&spec()).unwrap().is_empty());
    }

    #[test]
    fn ensure_table_adds_new_declared_columns() {
        let store = store();
        store.insert(&spec(), &record(json!({"id": "a", "memo": "x"}))).unwrap();

        let widened = TableSpec::new(
            "transactions",
            "id",
            &EntitySchema::new()
                .field("amount", FieldType::Number)
                .field("date", FieldType::Timestamp)
                .field("payee", FieldType::String),
        );
        store.ensure_table(&widened).unwrap();
        store
            .insert(&widened, &record(json!({"id": "b", "payee": "Grocer"})))
            .unwrap();
        let b = store.get(&widened, "b").unwrap().unwrap();
        assert_eq!(b["payee"], json!("Grocer"));
        let a = store.get(&widened, "a").unwrap().unwrap();
        assert_eq!(a["memo"], json!("x"));
    }

    #[test]
    fn run_lifecycle() {
        let store = SqliteLocalStore::in_memory().unwrap();
        let run_id = store.start_run("transaction", RunKind::Push).unwrap();
        assert!(run_id > 0);

        store
            .complete_run(
                run_id,
                RunStatus::Partial,
                &RunStats {
                    records_read: 1200,
                    records_written: 1000,
                    records_skipped: 0,
                    error_message: Some("UNAVAILABLE: chunk 3".into()),
                },
            )
            .unwrap();

        let (status, written, finished, error) = store.get_run_row(run_id).unwrap();
        assert_eq!(status, "partial");
        assert_eq!(written, 1000);
        assert!(finished.is_some());
        assert_eq!(error.as_deref(), Some("UNAVAILABLE: chunk 3"));
    }

    #[test]
    fn recent_runs_newest_first() {
        let store = SqliteLocalStore::in_memory().unwrap();
        let first = store.start_run("user", RunKind::Pull).unwrap();
        let second = store.start_run("user", RunKind::Push).unwrap();
        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), [second, first]);
        assert_eq!(runs[0].kind, "push");
        assert_eq!(runs[0].status, "running");
        assert!(runs[0].started_at.ends_with('Z'));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/local.db");
        {
            let store = SqliteLocalStore::open(&path).unwrap();
            store.ensure_table(&spec()).unwrap();
            store.insert(&spec(), &record(json!({"id": "t1"}))).unwrap();
        }
        let reopened = SqliteLocalStore::open(&path).unwrap();
        assert!(reopened.get(&spec(), "t1").unwrap().is_some());
    }
}
