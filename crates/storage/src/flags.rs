// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flag table queries.
//!
//! `set` is a compare-and-swap on value: writing the current value leaves
//! the row (and its timestamp) untouched, so `timestamp` always records the
//! last actual change.

use fm_core::Flag;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Database, StorageError};

pub fn get(conn: &Connection, id: &str, backend: &str) -> Result<Option<Flag>, StorageError> {
    let flag = conn
        .query_row(
            "SELECT id, value, backend, timestamp FROM flags WHERE id = ?1 AND backend = ?2",
            params![id, backend],
            |row| {
                Ok(Flag {
                    id: row.get(0)?,
                    value: row.get(1)?,
                    backend: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(flag)
}

pub fn set(
    conn: &Connection,
    id: &str,
    value: Option<&str>,
    backend: &str,
    now: i64,
) -> Result<Flag, StorageError> {
    if let Some(existing) = get(conn, id, backend)? {
        if existing.value.as_deref() == value {
            return Ok(existing);
        }
    }
    conn.execute(
        "INSERT INTO flags (id, value, backend, timestamp) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (id, backend) DO UPDATE SET value = ?2, timestamp = ?4",
        params![id, value, backend, now],
    )?;
    Ok(Flag {
        id: id.to_string(),
        value: value.map(str::to_string),
        backend: backend.to_string(),
        timestamp: Some(now),
    })
}

pub fn all_for_backend(conn: &Connection, backend: &str) -> Result<Vec<Flag>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, value, backend, timestamp FROM flags WHERE backend = ?1 ORDER BY id",
    )?;
    let flags = stmt
        .query_map(params![backend], |row| {
            Ok(Flag {
                id: row.get(0)?,
                value: row.get(1)?,
                backend: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(flags)
}

impl Database {
    pub fn get_flag(&self, id: &str, backend: &str) -> Result<Option<Flag>, StorageError> {
        self.with_conn(|conn| get(conn, id, backend))
    }

    /// Current value of a flag, or `default` when unset.
    pub fn flag_value(
        &self,
        id: &str,
        backend: &str,
        default: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        let flag = self.get_flag(id, backend)?;
        Ok(flag.and_then(|f| f.value).or_else(|| default.map(str::to_string)))
    }

    pub fn set_flag(
        &self,
        id: &str,
        value: Option<&str>,
        backend: &str,
        now: i64,
    ) -> Result<Flag, StorageError> {
        self.with_conn(|conn| set(conn, id, value, backend, now))
    }

    pub fn flags_for_backend(&self, backend: &str) -> Result<Vec<Flag>, StorageError> {
        self.with_conn(|conn| all_for_backend(conn, backend))
    }
}

#[cfg(test)]
#[path = "flags_tests.rs"]
mod flags_tests;
