// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Types shared with executor implementations.
//!
//! `ExecutorState` is the runtime-facing phase of a job as reported by the
//! container runtime; it is distinct from the persisted job `State` and is
//! never stored.

use crate::job::OutputSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime-facing phase of a job, owned by the executor adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Unknown,
    Preparing,
    Prepared,
    Executing,
    Executed,
    Finalizing,
    Finalized,
    Error,
}

crate::simple_display! {
    ExecutorState {
        Unknown => "unknown",
        Preparing => "preparing",
        Prepared => "prepared",
        Executing => "executing",
        Executed => "executed",
        Finalizing => "finalizing",
        Finalized => "finalized",
        Error => "error",
    }
}

/// Privacy classification of produced files. Highly sensitive artefacts
/// never leave the backend; moderately sensitive ones are released for
/// review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    HighlySensitive,
    ModeratelySensitive,
}

crate::simple_display! {
    Privacy {
        HighlySensitive => "highly_sensitive",
        ModeratelySensitive => "moderately_sensitive",
    }
}

/// Privacy levels accepted in a project file's `outputs` section.
pub const PRIVACY_LEVELS: [&str; 3] =
    ["highly_sensitive", "moderately_sensitive", "minimally_sensitive"];

/// The study code a job runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub repo_url: String,
    pub commit: String,
}

/// Everything an executor needs to drive one job's container lifecycle.
/// Derived from a [`crate::Job`] row; executors never see the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub job_request_id: String,
    pub study: Study,
    pub workspace: String,
    pub action: String,
    pub created_at: i64,
    /// Registry-unqualified image reference, e.g. `python:latest`
    pub image: String,
    /// Arguments after the image token
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Files from prior actions to materialise into the job volume
    pub inputs: Vec<String>,
    pub output_spec: OutputSpec,
    pub allow_network_access: bool,
    /// True for extraction commands; gates database env injection
    pub requires_db: bool,
    pub database_name: Option<String>,
    pub cancelled: bool,
}

/// Snapshot of an executor's view of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: ExecutorState,
    pub message: Option<String>,
    pub timestamp_ns: Option<i64>,
}

impl JobStatus {
    pub fn new(state: ExecutorState) -> Self {
        Self { state, message: None, timestamp_ns: None }
    }

    pub fn with_message(state: ExecutorState, message: impl Into<String>) -> Self {
        Self { state, message: Some(message.into()), timestamp_ns: None }
    }
}

/// Results harvested at finalization; available iff the executor reports
/// `Finalized`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResults {
    /// filename → privacy level
    pub outputs: BTreeMap<String, String>,
    pub unmatched_patterns: Vec<String>,
    pub unmatched_outputs: Vec<String>,
    pub exit_code: i64,
    /// Image digest the container actually ran
    pub image_id: String,
    pub message: Option<String>,
    /// Study-developer-oriented guidance, e.g. for unmatched patterns
    pub hint: Option<String>,
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod executor_tests;
