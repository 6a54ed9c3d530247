// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job table queries.
//!
//! Free functions take a `&Connection` so they compose inside transactions;
//! the `Database` methods wrap them for single-statement use. Hot-loop
//! queries are always bounded by `state` or `backend`.

use fm_core::{Job, State};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;

use crate::{Database, StorageError};

const JOB_COLUMNS: &str = "id, job_request_id, state, status_code, status_message, repo_url, \
     \"commit\", workspace, database_name, backend, action, action_repo_url, action_commit, \
     requires_outputs_from, wait_for_job_ids, run_command, image_id, output_spec, outputs, \
     unmatched_outputs, unmatched_patterns, cancelled, created_at, updated_at, started_at, \
     completed_at, status_code_updated_at, trace_context";

fn job_params(job: &Job) -> Result<[Box<dyn rusqlite::ToSql>; 28], StorageError> {
    Ok([
        Box::new(job.id.clone()),
        Box::new(job.job_request_id.clone()),
        Box::new(job.state.to_string()),
        Box::new(job.status_code.to_string()),
        Box::new(job.status_message.clone()),
        Box::new(job.repo_url.clone()),
        Box::new(job.commit.clone()),
        Box::new(job.workspace.clone()),
        Box::new(job.database_name.clone()),
        Box::new(job.backend.clone()),
        Box::new(job.action.clone()),
        Box::new(job.action_repo_url.clone()),
        Box::new(job.action_commit.clone()),
        Box::new(serde_json::to_string(&job.requires_outputs_from)?),
        Box::new(serde_json::to_string(&job.wait_for_job_ids)?),
        Box::new(job.run_command.clone()),
        Box::new(job.image_id.clone()),
        Box::new(serde_json::to_string(&job.output_spec)?),
        Box::new(serde_json::to_string(&job.outputs)?),
        Box::new(serde_json::to_string(&job.unmatched_outputs)?),
        Box::new(serde_json::to_string(&job.unmatched_patterns)?),
        Box::new(job.cancelled),
        Box::new(job.created_at),
        Box::new(job.updated_at),
        Box::new(job.started_at),
        Box::new(job.completed_at),
        Box::new(job.status_code_updated_at),
        Box::new(job.trace_context.clone()),
    ])
}

/// Decode a JSON-encoded column, surfacing decode failures as conversion
/// errors on the offending column.
fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Decode an enum column from its wire string.
fn enum_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_value(serde_json::Value::String(raw))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        job_request_id: row.get(1)?,
        state: enum_column(row, 2)?,
        status_code: enum_column(row, 3)?,
        status_message: row.get(4)?,
        repo_url: row.get(5)?,
        commit: row.get(6)?,
        workspace: row.get(7)?,
        database_name: row.get(8)?,
        backend: row.get(9)?,
        action: row.get(10)?,
        action_repo_url: row.get(11)?,
        action_commit: row.get(12)?,
        requires_outputs_from: json_column(row, 13)?,
        wait_for_job_ids: json_column(row, 14)?,
        run_command: row.get(15)?,
        image_id: row.get(16)?,
        output_spec: json_column(row, 17)?,
        outputs: json_column(row, 18)?,
        unmatched_outputs: json_column(row, 19)?,
        unmatched_patterns: json_column(row, 20)?,
        cancelled: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
        started_at: row.get(24)?,
        completed_at: row.get(25)?,
        status_code_updated_at: row.get(26)?,
        trace_context: row.get(27)?,
    })
}

fn select_jobs(
    conn: &Connection,
    where_clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Job>, StorageError> {
    let sql =
        format!("SELECT {} FROM job WHERE {} ORDER BY created_at, id", JOB_COLUMNS, where_clause);
    let mut stmt = conn.prepare(&sql)?;
    let jobs = stmt
        .query_map(params, job_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(jobs)
}

pub fn insert(conn: &Connection, job: &Job) -> Result<(), StorageError> {
    let values = job_params(job)?;
    let placeholders =
        (1..=values.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
    let sql = format!("INSERT INTO job ({}) VALUES ({})", JOB_COLUMNS, placeholders);
    let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, refs.as_slice())?;
    Ok(())
}

/// Full-row update keyed by `id`.
pub fn update(conn: &Connection, job: &Job) -> Result<(), StorageError> {
    let values = job_params(job)?;
    let assignments = JOB_COLUMNS
        .split(", ")
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", column.trim(), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE job SET {} WHERE id = ?{}", assignments, values.len() + 1);
    let mut refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    refs.push(&job.id);
    conn.execute(&sql, refs.as_slice())?;
    Ok(())
}

pub fn by_id(conn: &Connection, id: &str) -> Result<Option<Job>, StorageError> {
    Ok(select_jobs(conn, "id = ?1", &[&id])?.into_iter().next())
}

/// All jobs whose ID starts with `partial`. Used by operator commands which
/// accept abbreviated IDs.
pub fn by_partial_id(conn: &Connection, partial: &str) -> Result<Vec<Job>, StorageError> {
    let pattern = format!("{}%", partial.replace('%', ""));
    select_jobs(conn, "id LIKE ?1", &[&pattern])
}

pub fn active_for_backend(conn: &Connection, backend: &str) -> Result<Vec<Job>, StorageError> {
    select_jobs(
        conn,
        "state IN ('pending', 'running') AND backend = ?1",
        &[&backend],
    )
}

pub fn active_for_workspace(conn: &Connection, workspace: &str) -> Result<Vec<Job>, StorageError> {
    select_jobs(conn, "state IN ('pending', 'running') AND workspace = ?1", &[&workspace])
}

/// Every job ever run in `workspace`; input to the workspace-state
/// calculation.
pub fn for_workspace(conn: &Connection, workspace: &str) -> Result<Vec<Job>, StorageError> {
    select_jobs(conn, "workspace = ?1", &[&workspace])
}

pub fn for_request(conn: &Connection, request_id: &str) -> Result<Vec<Job>, StorageError> {
    select_jobs(conn, "job_request_id = ?1", &[&request_id])
}

pub fn for_requests(conn: &Connection, request_ids: &[String]) -> Result<Vec<Job>, StorageError> {
    if request_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders =
        (1..=request_ids.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
    let clause = format!("job_request_id IN ({})", placeholders);
    let refs: Vec<&dyn rusqlite::ToSql> =
        request_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    select_jobs(conn, &clause, refs.as_slice())
}

pub fn exists_for_request(conn: &Connection, request_id: &str) -> Result<bool, StorageError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM job WHERE job_request_id = ?1)",
        params![request_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// States of the given job IDs, in no particular order.
pub fn states_of(conn: &Connection, ids: &[String]) -> Result<Vec<State>, StorageError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (1..=ids.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
    let sql = format!("SELECT state FROM job WHERE id IN ({})", placeholders);
    let refs: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let mut stmt = conn.prepare(&sql)?;
    let states = stmt
        .query_map(refs.as_slice(), |row| enum_column::<State>(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(states)
}

/// Flag the named actions of a request as cancelled.
pub fn mark_cancelled(
    conn: &Connection,
    request_id: &str,
    actions: &[String],
) -> Result<usize, StorageError> {
    if actions.is_empty() {
        return Ok(0);
    }
    let placeholders =
        (2..=actions.len() + 1).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "UPDATE job SET cancelled = TRUE WHERE job_request_id = ?1 AND action IN ({})",
        placeholders
    );
    let mut refs: Vec<&dyn rusqlite::ToSql> = vec![&request_id];
    refs.extend(actions.iter().map(|a| a as &dyn rusqlite::ToSql));
    Ok(conn.execute(&sql, refs.as_slice())?)
}

impl Database {
    pub fn insert_job(&self, job: &Job) -> Result<(), StorageError> {
        self.with_conn(|conn| insert(conn, job))
    }

    pub fn update_job(&self, job: &Job) -> Result<(), StorageError> {
        self.with_conn(|conn| update(conn, job))
    }

    pub fn job_by_id(&self, id: &str) -> Result<Option<Job>, StorageError> {
        self.with_conn(|conn| by_id(conn, id))
    }

    pub fn jobs_by_partial_id(&self, partial: &str) -> Result<Vec<Job>, StorageError> {
        self.with_conn(|conn| by_partial_id(conn, partial))
    }

    /// Active jobs for a backend in stable FIFO order (`created_at`, then id).
    pub fn active_jobs_for_backend(&self, backend: &str) -> Result<Vec<Job>, StorageError> {
        self.with_conn(|conn| active_for_backend(conn, backend))
    }

    pub fn active_jobs_for_workspace(&self, workspace: &str) -> Result<Vec<Job>, StorageError> {
        self.with_conn(|conn| active_for_workspace(conn, workspace))
    }

    pub fn jobs_for_workspace(&self, workspace: &str) -> Result<Vec<Job>, StorageError> {
        self.with_conn(|conn| for_workspace(conn, workspace))
    }

    pub fn jobs_for_request(&self, request_id: &str) -> Result<Vec<Job>, StorageError> {
        self.with_conn(|conn| for_request(conn, request_id))
    }

    pub fn jobs_for_requests(&self, request_ids: &[String]) -> Result<Vec<Job>, StorageError> {
        self.with_conn(|conn| for_requests(conn, request_ids))
    }

    pub fn jobs_exist_for_request(&self, request_id: &str) -> Result<bool, StorageError> {
        self.with_conn(|conn| exists_for_request(conn, request_id))
    }

    pub fn job_states_of(&self, ids: &[String]) -> Result<Vec<State>, StorageError> {
        self.with_conn(|conn| states_of(conn, ids))
    }

    pub fn mark_jobs_cancelled(
        &self,
        request_id: &str,
        actions: &[String],
    ) -> Result<usize, StorageError> {
        self.with_conn(|conn| mark_cancelled(conn, request_id, actions))
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod jobs_tests;
