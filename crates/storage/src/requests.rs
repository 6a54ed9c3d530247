// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JobRequest table queries.
//!
//! Only the opaque original payload is stored, for audit and debugging; the
//! typed request is never needed again once its jobs exist.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Database, StorageError};

pub fn insert(
    conn: &Connection,
    id: &str,
    original: &serde_json::Value,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO job_request (id, original) VALUES (?1, ?2)",
        params![id, serde_json::to_string(original)?],
    )?;
    Ok(())
}

pub fn original(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, StorageError> {
    let raw = conn
        .query_row(
            "SELECT original FROM job_request WHERE id = ?1",
            params![id],
            |row| {
                let raw: String = row.get(0)?;
                serde_json::from_str(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })
            },
        )
        .optional()?;
    Ok(raw)
}

impl Database {
    pub fn insert_job_request(
        &self,
        id: &str,
        original: &serde_json::Value,
    ) -> Result<(), StorageError> {
        self.with_conn(|conn| insert(conn, id, original))
    }

    pub fn job_request_original(
        &self,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        self.with_conn(|conn| original(conn, id))
    }
}
