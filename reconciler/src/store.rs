//! Read-only access to the editor's `state.vscdb` key-value tables.

use crate::collect::best_effort;
use crate::error::Result;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::warn;

/// File name of both the per-workspace and the global store.
pub const STATE_DB_FILE: &str = "state.vscdb";

/// SQLite caps bound parameters per statement (999 on older builds).
const MAX_KEYS_PER_QUERY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Small settings-style records, present in both stores.
    Item,
    /// Large per-record payloads, global store only.
    DiskKv,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Item => "ItemTable",
            Table::DiskKv => "cursorDiskKV",
        }
    }
}

/// Open a store without ever creating or writing to it.
pub fn open_read_only(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

pub fn has_table(conn: &Connection, table: Table) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table.name()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Single point lookup. A missing table reads as a missing key, and so does
/// a value that is neither text nor a blob.
pub fn read_value(conn: &Connection, table: Table, key: &str) -> Result<Option<String>> {
    if !has_table(conn, table)? {
        return Ok(None);
    }
    let sql = format!("SELECT value FROM {} WHERE key = ?1", table.name());
    let value = conn
        .query_row(&sql, [key], |row| Ok(value_as_string(row.get_ref(0)?)))
        .optional()?;
    Ok(match value {
        Some(Some(text)) => Some(text),
        Some(None) => {
            warn!(table = table.name(), key, "skipping non-text store value");
            None
        }
        None => None,
    })
}

/// Batched point lookup. Rows come back in no particular order; keys with
/// no row are simply absent from the result, as are rows whose value is
/// neither text nor a blob.
pub fn read_values(
    conn: &Connection,
    table: Table,
    keys: &[String],
) -> Result<Vec<(String, String)>> {
    if keys.is_empty() || !has_table(conn, table)? {
        return Ok(Vec::new());
    }

    let mut raw_rows = Vec::new();
    for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT key, value FROM {} WHERE key IN ({placeholders})",
            table.name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            let key: String = row.get(0)?;
            Ok((key, value_as_string(row.get_ref(1)?)))
        })?;
        for row in rows {
            raw_rows.push(row?);
        }
    }

    let rows = raw_rows.into_iter().map(|(key, value)| match value {
        Some(text) => Ok((key, text)),
        None => Err(format!("{key}: value is neither text nor blob")),
    });
    Ok(best_effort(table.name(), rows).into_items())
}

/// Convenience for one-off reads such as the auth token.
pub fn read_item_at(db_path: &Path, key: &str) -> Result<Option<String>> {
    let conn = open_read_only(db_path)?;
    read_value(&conn, Table::Item, key)
}

// Values are written as TEXT by some editor versions and BLOB by others.
fn value_as_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(s) | ValueRef::Blob(s) => Some(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Null | ValueRef::Integer(_) | ValueRef::Real(_) => None,
    }
}
