// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller↔agent handoff records.
//!
//! Where the controller and the container-running agent are split across
//! processes, work is handed over as Task rows. At most one active `RunJob`
//! task exists per job at any moment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RunJob,
    CancelJob,
    DbStatus,
    Status,
}

crate::simple_display! {
    TaskType {
        RunJob => "RUNJOB",
        CancelJob => "CANCELJOB",
        DbStatus => "DBSTATUS",
        Status => "STATUS",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub active: bool,
    pub backend: String,
    pub created_at: i64,
    pub finished_at: Option<i64>,
    /// Type-specific payload, e.g. the JobDefinition for a RunJob
    pub definition: serde_json::Value,
    pub results: Option<serde_json::Value>,
}

impl Task {
    /// Conventional task ID for the run task of a job.
    pub fn run_job_id(job_id: &str) -> String {
        format!("runjob-{}", job_id)
    }

    /// Conventional task ID for a cancellation of a job.
    pub fn cancel_job_id(job_id: &str) -> String {
        format!("canceljob-{}", job_id)
    }
}
