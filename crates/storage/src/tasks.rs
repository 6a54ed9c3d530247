// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task table queries (controller↔agent handoff records).

use fm_core::{Task, TaskType};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{Database, StorageError};

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let task_type: String = row.get(1)?;
    let task_type: TaskType = serde_json::from_value(serde_json::Value::String(task_type))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let definition: String = row.get(6)?;
    let definition = serde_json::from_str(&definition)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let results: Option<String> = row.get(7)?;
    let results = match results {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(Task {
        id: row.get(0)?,
        task_type,
        active: row.get(2)?,
        backend: row.get(3)?,
        created_at: row.get(4)?,
        finished_at: row.get(5)?,
        definition,
        results,
    })
}

const TASK_COLUMNS: &str =
    "id, task_type, active, backend, created_at, finished_at, definition, results";

pub fn insert(conn: &Connection, task: &Task) -> Result<(), StorageError> {
    // Replace wholesale: task IDs are deterministic, so re-dispatching a
    // job reuses its row
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO task ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            TASK_COLUMNS
        ),
        params![
            task.id,
            task.task_type.to_string(),
            task.active,
            task.backend,
            task.created_at,
            task.finished_at,
            serde_json::to_string(&task.definition)?,
            task.results.as_ref().map(serde_json::to_string).transpose()?,
        ],
    )?;
    Ok(())
}

pub fn by_id(conn: &Connection, id: &str) -> Result<Option<Task>, StorageError> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM task WHERE id = ?1", TASK_COLUMNS),
            params![id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

/// The single active RunJob task for a job, if any.
pub fn active_run_job_for(conn: &Connection, job_id: &str) -> Result<Option<Task>, StorageError> {
    let task = conn
        .query_row(
            &format!(
                "SELECT {} FROM task WHERE id = ?1 AND active",
                TASK_COLUMNS
            ),
            params![Task::run_job_id(job_id)],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

pub fn deactivate(conn: &Connection, id: &str, finished_at: i64) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE task SET active = FALSE, finished_at = ?2 WHERE id = ?1 AND active",
        params![id, finished_at],
    )?;
    Ok(())
}

pub fn active_for_backend(conn: &Connection, backend: &str) -> Result<Vec<Task>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM task WHERE backend = ?1 AND active ORDER BY created_at, id",
        TASK_COLUMNS
    ))?;
    let tasks = stmt
        .query_map(params![backend], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

impl Database {
    pub fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        self.with_conn(|conn| insert(conn, task))
    }

    pub fn task_by_id(&self, id: &str) -> Result<Option<Task>, StorageError> {
        self.with_conn(|conn| by_id(conn, id))
    }

    pub fn active_run_job_task(&self, job_id: &str) -> Result<Option<Task>, StorageError> {
        self.with_conn(|conn| active_run_job_for(conn, job_id))
    }

    pub fn deactivate_task(&self, id: &str, finished_at: i64) -> Result<(), StorageError> {
        self.with_conn(|conn| deactivate(conn, id, finished_at))
    }

    pub fn active_tasks_for_backend(&self, backend: &str) -> Result<Vec<Task>, StorageError> {
        self.with_conn(|conn| active_for_backend(conn, backend))
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tasks_tests;
