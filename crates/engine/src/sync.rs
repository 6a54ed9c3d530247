// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync loop: poll the coordination server for active JobRequests,
//! expand them, and post job snapshots back.
//!
//! HTTP failures are logged and retried on the next tick; they never crash
//! the process.

use async_trait::async_trait;
use fm_core::{timestamp_to_isoformat, Clock, Flag, Job, JobRequest, State, StatusCode};
use fm_pipeline::GitClient;
use fm_storage::{Database, StorageError};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::expand::create_or_update_jobs;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("coordination server error: {0}")]
    Http(String),
    #[error("could not decode job request: {0}")]
    Decode(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Client seam for the coordination server's HTTP API.
#[async_trait]
pub trait CoordinationApi: Send + Sync {
    /// `GET job-requests?backend=<B>&active=true` with the Flags header.
    async fn fetch_job_requests(
        &self,
        backend: &str,
        flags_header: &str,
    ) -> Result<Vec<serde_json::Value>, SyncError>;

    /// `POST jobs` with trimmed job snapshots.
    async fn post_jobs(&self, snapshots: &[JobSnapshot]) -> Result<(), SyncError>;
}

/// The trimmed job representation POSTed back to the coordination server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub job_request_id: String,
    pub action: String,
    pub state: State,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

/// Serialize flags as the compact `{id: {v, ts}}` map sent as the `Flags`
/// request header.
pub fn flags_header(flags: &[Flag]) -> String {
    let mut map = serde_json::Map::new();
    for flag in flags {
        let mut entry = serde_json::Map::new();
        entry.insert(
            "v".to_string(),
            flag.value.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
        );
        entry.insert(
            "ts".to_string(),
            flag.timestamp
                .map(|ts| serde_json::Value::String(timestamp_to_isoformat(ts)))
                .unwrap_or(serde_json::Value::Null),
        );
        map.insert(flag.id.clone(), serde_json::Value::Object(entry));
    }
    serde_json::Value::Object(map).to_string()
}

/// Convert a JobRequest payload as received from the coordination server
/// into our internal representation. The original payload is carried along
/// verbatim for audit.
pub fn job_request_from_wire(payload: serde_json::Value) -> Result<JobRequest, SyncError> {
    let string = |value: &serde_json::Value, key: &str| -> Result<String, SyncError> {
        match &value[key] {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            _ => Err(SyncError::Decode(format!("missing field '{}'", key))),
        }
    };
    let string_list = |value: &serde_json::Value, key: &str| -> Vec<String> {
        value[key]
            .as_array()
            .map(|items| {
                items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect()
            })
            .unwrap_or_default()
    };

    let workspace = &payload["workspace"];
    let request = JobRequest {
        id: string(&payload, "identifier").or_else(|_| string(&payload, "id"))?,
        repo_url: string(workspace, "repo")?,
        commit: payload["sha"].as_str().filter(|s| !s.is_empty()).map(str::to_string),
        branch: string(workspace, "branch").unwrap_or_default(),
        requested_actions: string_list(&payload, "requested_actions"),
        cancelled_actions: string_list(&payload, "cancelled_actions"),
        workspace: string(workspace, "name")?,
        database_name: string(workspace, "db").unwrap_or_else(|_| "full".to_string()),
        backend: string(&payload, "backend").unwrap_or_default(),
        force_run_dependencies: payload["force_run_dependencies"].as_bool().unwrap_or(false),
        force_run_failed: payload["force_run_failed"].as_bool().unwrap_or(false),
        original: payload,
    };
    Ok(request)
}

/// Convert a Job into the wire format expected by the coordination server.
pub fn job_to_wire(job: &Job) -> JobSnapshot {
    JobSnapshot {
        id: job.id.clone(),
        job_request_id: job.job_request_id.clone(),
        action: job.action.clone(),
        state: job.state,
        status_code: job.status_code,
        status_message: job.status_message.clone(),
        created_at: Some(timestamp_to_isoformat(job.created_at)),
        updated_at: Some(timestamp_to_isoformat(job.updated_at)),
        started_at: job.started_at.map(timestamp_to_isoformat),
        completed_at: job.completed_at.map(timestamp_to_isoformat),
        outputs: job.outputs.clone(),
    }
}

/// One full sync pass: fetch, expand, report back.
pub async fn sync_once<C: Clock>(
    db: &Database,
    git: &dyn GitClient,
    api: &dyn CoordinationApi,
    config: &EngineConfig,
    clock: &C,
) -> Result<(), SyncError> {
    let flags = db.flags_for_backend(&config.backend)?;
    let payloads = api.fetch_job_requests(&config.backend, &flags_header(&flags)).await?;

    let mut requests = Vec::with_capacity(payloads.len());
    for payload in payloads {
        requests.push(job_request_from_wire(payload)?);
    }

    for request in &requests {
        create_or_update_jobs(db, git, config, clock, request).await?;
    }

    let request_ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
    let jobs = db.jobs_for_requests(&request_ids)?;
    if jobs.is_empty() {
        return Ok(());
    }
    let snapshots: Vec<JobSnapshot> = jobs.iter().map(job_to_wire).collect();
    api.post_jobs(&snapshots).await
}

/// Run sync passes until cancelled, on the poll interval.
pub async fn run_sync_loop<C: Clock>(
    db: Database,
    git: std::sync::Arc<dyn GitClient>,
    api: std::sync::Arc<dyn CoordinationApi>,
    config: EngineConfig,
    clock: C,
    shutdown: CancellationToken,
) {
    tracing::info!(backend = %config.backend, "sync loop started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let delay = match sync_once(&db, git.as_ref(), api.as_ref(), &config, &clock).await {
            Ok(()) => config.poll_interval,
            Err(e) => {
                tracing::error!(error = %e, "sync failed");
                config.poll_interval * 5
            }
        };
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::info!(backend = %config.backend, "sync loop stopped");
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod sync_tests;
