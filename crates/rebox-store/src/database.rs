//! Relational backend.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] behind an async
//! mutex and guarantees that migrations are run before any other operation.
//! Filters and patches are translated from camelCase fields into SQL through
//! each record's [`Record::FIELDS`] layout, and every committed insert is
//! announced on the [`RealtimeHub`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rebox_shared::Backend;
use rusqlite::types::Value as SqlValue;
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::query::{Condition, Filter, Patch};
use crate::realtime::{RealtimeHub, RowInsert};
use crate::record::{format_timestamp, Field, FieldKind, Record};
use crate::store::{MutualLikes, Store};

/// SQLite-backed [`Store`].
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    realtime: RealtimeHub,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private database that disappears with the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            realtime: RealtimeHub::default(),
        })
    }

    /// Replace the insert channel with one of the given capacity.
    pub fn with_realtime_capacity(mut self, capacity: usize) -> Self {
        self.realtime = RealtimeHub::new(capacity);
        self
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

// ---------------------------------------------------------------------------
// SQL translation
// ---------------------------------------------------------------------------

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn unknown_field<R: Record>(name: &str) -> StoreError {
    StoreError::UnknownField {
        collection: R::COLLECTION,
        field: name.to_string(),
    }
}

/// Convert one JSON scalar into the SQL encoding used by `kind`.
fn scalar(field: &Field, value: &Value) -> Result<SqlValue> {
    match (field.kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (FieldKind::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (FieldKind::Timestamp, Value::String(s)) => {
            let dt: DateTime<Utc> = s.parse()?;
            Ok(SqlValue::Text(format_timestamp(&dt)))
        }
        (FieldKind::Text, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (_, other) => Err(StoreError::InvalidQuery(format!(
            "cannot compare `{}` with {other}",
            field.name
        ))),
    }
}

/// Spread a value over the field's columns: a scalar for single-column
/// fields, an array of matching length for multi-column ones.
fn spread(field: &Field, value: &Value) -> Result<Vec<SqlValue>> {
    match (field.columns.len(), value) {
        (1, v) => Ok(vec![scalar(field, v)?]),
        (n, Value::Array(items)) if items.len() == n => {
            items.iter().map(|v| scalar(field, v)).collect()
        }
        (n, Value::Null) => Ok(vec![SqlValue::Null; n]),
        (n, other) => Err(StoreError::InvalidQuery(format!(
            "`{}` spans {n} columns, got {other}",
            field.name
        ))),
    }
}

fn condition_sql(field: &Field, cond: &Condition, params: &mut Vec<SqlValue>) -> Result<String> {
    let cols = field.columns;
    match cond {
        Condition::Eq(_, v) | Condition::Ne(_, v) => {
            params.extend(spread(field, v)?);
            // IS compares NULLs as equal, like the JSON evaluation does
            let eq = cols
                .iter()
                .map(|c| format!("{c} IS ?"))
                .collect::<Vec<_>>()
                .join(" AND ");
            if matches!(cond, Condition::Eq(..)) {
                Ok(format!("({eq})"))
            } else {
                Ok(format!("NOT ({eq})"))
            }
        }
        Condition::In(_, values) => {
            let [col] = cols else {
                return Err(StoreError::InvalidQuery(format!(
                    "IN is not supported on `{}`",
                    field.name
                )));
            };
            if values.is_empty() {
                return Ok("0".to_string());
            }
            for v in values {
                params.push(scalar(field, v)?);
            }
            Ok(format!("{col} IN ({})", placeholders(values.len())))
        }
        Condition::Contains(_, v) => {
            if cols.len() < 2 {
                return Err(StoreError::InvalidQuery(format!(
                    "`{}` is not an array field",
                    field.name
                )));
            }
            let value = scalar(field, v)?;
            params.extend(std::iter::repeat(value).take(cols.len()));
            let any = cols
                .iter()
                .map(|c| format!("{c} IS ?"))
                .collect::<Vec<_>>()
                .join(" OR ");
            Ok(format!("({any})"))
        }
    }
}

fn where_clause<R: Record>(filter: &Filter) -> Result<(String, Vec<SqlValue>)> {
    if filter.conditions().is_empty() {
        return Ok(("1".to_string(), Vec::new()));
    }

    let mut params = Vec::new();
    let mut parts = Vec::with_capacity(filter.conditions().len());
    for cond in filter.conditions() {
        let field = R::field(cond.field()).ok_or_else(|| unknown_field::<R>(cond.field()))?;
        parts.push(condition_sql(field, cond, &mut params)?);
    }
    Ok((parts.join(" AND "), params))
}

/// Map uniqueness violations to [`StoreError::Conflict`].
fn write_error(e: rusqlite::Error, collection: &'static str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            StoreError::Conflict { collection }
        }
        _ => StoreError::Sqlite(e),
    }
}

fn not_found<R: Record>(id: &str) -> StoreError {
    StoreError::NotFound {
        collection: R::COLLECTION,
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Synchronous helpers (called with the connection locked)
// ---------------------------------------------------------------------------

fn select_where<R: Record>(conn: &Connection, filter: &Filter) -> Result<Vec<R>> {
    let (clause, params) = where_clause::<R>(filter)?;
    let sql = format!(
        "SELECT {} FROM {} WHERE {clause} ORDER BY rowid",
        R::columns().join(", "),
        R::COLLECTION
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), R::from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn select_by_id<R: Record>(conn: &Connection, id: &str) -> Result<Option<R>> {
    Ok(select_where::<R>(conn, &Filter::new().eq("id", id))?
        .into_iter()
        .next())
}

/// Overwrite every column of the row currently stored under `id`.
fn write_back<R: Record>(conn: &Connection, id: &str, record: &R) -> Result<()> {
    let assignments = R::columns()
        .iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {assignments} WHERE id = ?", R::COLLECTION);

    let mut values = record.to_sql();
    values.push(SqlValue::Text(id.to_string()));
    conn.execute(&sql, params_from_iter(values))
        .map_err(|e| write_error(e, R::COLLECTION))?;
    Ok(())
}

fn patched<R: Record>(record: &R, patch: &Patch) -> Result<R> {
    for (name, _) in patch.fields() {
        if R::field(name).is_none() {
            return Err(unknown_field::<R>(name));
        }
    }
    Ok(patch.apply_record(record)?)
}

/// Item id of the earliest like from `from` on any item owned by `to`.
fn earliest_liked_item(conn: &Connection, from: &str, to: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT to_item_id FROM likes
             WHERE from_user_id = ?1 AND to_user_id = ?2
             ORDER BY created_at, rowid
             LIMIT 1",
            params![from, to],
            |row| row.get(0),
        )
        .optional()?)
}

// ---------------------------------------------------------------------------
// Store implementation
// ---------------------------------------------------------------------------

impl Store for Database {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let json = serde_json::to_string(value)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn get_collection<R: Record>(&self) -> Result<Vec<R>> {
        self.find_where(&Filter::new()).await
    }

    async fn append<R: Record>(&self, record: &R) -> Result<()> {
        let columns = R::columns();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::COLLECTION,
            columns.join(", "),
            placeholders(columns.len())
        );
        let event = RowInsert::new(record)?;

        {
            let conn = self.conn.lock().await;
            conn.execute(&sql, params_from_iter(record.to_sql()))
                .map_err(|e| write_error(e, R::COLLECTION))?;
        }

        let receivers = self.realtime.publish(event);
        tracing::debug!(
            table = R::COLLECTION,
            id = record.id(),
            receivers,
            "row inserted"
        );
        Ok(())
    }

    async fn update_where<R: Record>(&self, id: &str, patch: Patch) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let current = select_by_id::<R>(&tx, id)?.ok_or_else(|| not_found::<R>(id))?;
        let updated = patched(&current, &patch)?;
        write_back(&tx, id, &updated)?;

        tx.commit()?;
        Ok(())
    }

    async fn update_many<R: Record>(&self, filter: &Filter, patch: Patch) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let matched = select_where::<R>(&tx, filter)?;
        for record in &matched {
            let updated = patched(record, &patch)?;
            write_back(&tx, record.id(), &updated)?;
        }

        tx.commit()?;
        Ok(matched.len())
    }

    async fn remove_where<R: Record>(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let sql = format!("DELETE FROM {} WHERE id = ?1", R::COLLECTION);
        let affected = conn.execute(&sql, params![id])?;
        if affected == 0 {
            return Err(not_found::<R>(id));
        }
        Ok(())
    }

    async fn remove_many<R: Record>(&self, filter: &Filter) -> Result<usize> {
        let (clause, params) = where_clause::<R>(filter)?;
        let sql = format!("DELETE FROM {} WHERE {clause}", R::COLLECTION);

        let conn = self.conn.lock().await;
        Ok(conn.execute(&sql, params_from_iter(params))?)
    }

    async fn find_one<R: Record>(&self, id: &str) -> Result<Option<R>> {
        let conn = self.conn.lock().await;
        select_by_id(&conn, id)
    }

    async fn find_where<R: Record>(&self, filter: &Filter) -> Result<Vec<R>> {
        let conn = self.conn.lock().await;
        select_where(&conn, filter)
    }

    async fn count_where<R: Record>(&self, filter: &Filter) -> Result<usize> {
        let (clause, params) = where_clause::<R>(filter)?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {clause}", R::COLLECTION);

        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn mutual_likes(&self, user_a: &str, user_b: &str) -> Result<MutualLikes> {
        let conn = self.conn.lock().await;
        let item_a_id = earliest_liked_item(&conn, user_b, user_a)?;
        let item_b_id = earliest_liked_item(&conn, user_a, user_b)?;
        Ok(MutualLikes::from_items(item_a_id, item_b_id))
    }

    fn realtime(&self) -> Option<&RealtimeHub> {
        Some(&self.realtime)
    }
}
