// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only numbered schema migrations.
//!
//! `PRAGMA user_version` records how many scripts have been applied; pending
//! scripts run inside a single transaction on open.

use rusqlite::Connection;

use crate::StorageError;

const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/0001_initial.sql"),
    include_str!("../migrations/0002_tasks.sql"),
];

pub fn apply(conn: &Connection) -> Result<(), StorageError> {
    let applied: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let applied = applied as usize;
    if applied >= MIGRATIONS.len() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied) {
        tx.execute_batch(sql)?;
        tracing::info!(migration = index + 1, "applied schema migration");
    }
    // user_version takes a literal, not a bound parameter
    tx.pragma_update(None, "user_version", MIGRATIONS.len() as i64)?;
    tx.commit()?;
    Ok(())
}

/// Number of known migrations (the expected `user_version` after open).
pub fn latest_version() -> usize {
    MIGRATIONS.len()
}

#[cfg(test)]
#[path = "migrations_tests.rs"]
mod migrations_tests;
