// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Job row: one action of one JobRequest, plus its state machine labels.

use crate::executor::ExecutorState;
use crate::id::deterministic_job_id;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Action name used for the synthetic job that reports a failed JobRequest.
pub const ERROR_ACTION: &str = "__error__";

/// Output specification: privacy level → output name → glob pattern.
pub type OutputSpec = IndexMap<String, IndexMap<String, String>>;

/// Coarse job state. Drives scheduling; a job is *active* iff it is
/// `Pending` or `Running`, and terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    Running,
    Failed,
    Succeeded,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Failed | State::Succeeded)
    }
}

crate::simple_display! {
    State {
        Pending => "pending",
        Running => "running",
        Failed => "failed",
        Succeeded => "succeeded",
    }
}

/// Fine-grained, machine-readable job status. Each code belongs to exactly
/// one [`State`]; codes are totally ordered only within their state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    // Pending
    Created,
    WaitingOnDependencies,
    WaitingOnWorkers,
    WaitingOnReboot,
    WaitingDbMaintenance,
    WaitingPaused,
    // Running
    Preparing,
    Prepared,
    Executing,
    Executed,
    Finalizing,
    Finalized,
    // Terminal
    Succeeded,
    NonzeroExit,
    DependencyFailed,
    CancelledByUser,
    KilledByAdmin,
    InternalError,
    JobError,
    UnmatchedPatterns,
}

crate::simple_display! {
    StatusCode {
        Created => "created",
        WaitingOnDependencies => "waiting_on_dependencies",
        WaitingOnWorkers => "waiting_on_workers",
        WaitingOnReboot => "waiting_on_reboot",
        WaitingDbMaintenance => "waiting_db_maintenance",
        WaitingPaused => "waiting_paused",
        Preparing => "preparing",
        Prepared => "prepared",
        Executing => "executing",
        Executed => "executed",
        Finalizing => "finalizing",
        Finalized => "finalized",
        Succeeded => "succeeded",
        NonzeroExit => "nonzero_exit",
        DependencyFailed => "dependency_failed",
        CancelledByUser => "cancelled_by_user",
        KilledByAdmin => "killed_by_admin",
        InternalError => "internal_error",
        JobError => "job_error",
        UnmatchedPatterns => "unmatched_patterns",
    }
}

impl StatusCode {
    /// The coarse [`State`] this code belongs to.
    pub fn state(self) -> State {
        match self {
            StatusCode::Created
            | StatusCode::WaitingOnDependencies
            | StatusCode::WaitingOnWorkers
            | StatusCode::WaitingOnReboot
            | StatusCode::WaitingDbMaintenance
            | StatusCode::WaitingPaused => State::Pending,
            StatusCode::Preparing
            | StatusCode::Prepared
            | StatusCode::Executing
            | StatusCode::Executed
            | StatusCode::Finalizing
            | StatusCode::Finalized => State::Running,
            StatusCode::Succeeded => State::Succeeded,
            StatusCode::NonzeroExit
            | StatusCode::DependencyFailed
            | StatusCode::CancelledByUser
            | StatusCode::KilledByAdmin
            | StatusCode::InternalError
            | StatusCode::JobError
            | StatusCode::UnmatchedPatterns => State::Failed,
        }
    }

    pub fn is_failure(self) -> bool {
        self.state() == State::Failed
    }

    /// The executor state a Running code corresponds to. `None` for codes
    /// the executor never reports (Pending and terminal codes).
    pub fn executor_state(self) -> Option<ExecutorState> {
        match self {
            StatusCode::Preparing => Some(ExecutorState::Preparing),
            StatusCode::Prepared => Some(ExecutorState::Prepared),
            StatusCode::Executing => Some(ExecutorState::Executing),
            StatusCode::Executed => Some(ExecutorState::Executed),
            StatusCode::Finalizing => Some(ExecutorState::Finalizing),
            StatusCode::Finalized => Some(ExecutorState::Finalized),
            _ => None,
        }
    }
}

/// A single action scheduled for a specific commit within a JobRequest.
///
/// Jobs are created by the expander, mutated only by the run loop (and the
/// operator CLI), and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Deterministic: derived from `job_request_id` and `action`.
    pub id: String,
    pub job_request_id: String,
    pub state: State,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    /// Git repository URL of the study code
    pub repo_url: String,
    /// Full commit sha of the study code
    pub commit: String,
    pub workspace: String,
    pub database_name: String,
    pub backend: String,
    /// Key of this action in the project pipeline
    pub action: String,
    /// Set only when the action resolved to a reusable action
    pub action_repo_url: Option<String>,
    pub action_commit: Option<String>,
    /// Actions whose outputs this action consumes
    pub requires_outputs_from: Vec<String>,
    /// Jobs which must reach `Succeeded` before this one may start: the
    /// subset of `requires_outputs_from` that had not already run
    pub wait_for_job_ids: Vec<String>,
    /// Final container invocation, shell-quoted into a single string
    pub run_command: String,
    /// Concrete image digest observed at run time
    pub image_id: Option<String>,
    pub output_spec: OutputSpec,
    /// Produced files matching the spec, as filename → privacy level
    pub outputs: BTreeMap<String, String>,
    /// Produced files matching no pattern (populated for debugging only
    /// when some pattern went unmatched)
    pub unmatched_outputs: Vec<String>,
    /// Patterns which matched no produced file
    pub unmatched_patterns: Vec<String>,
    /// User-requested cancellation; observed by the state machine on the
    /// next tick
    pub cancelled: bool,
    /// Whole-second UNIX timestamps
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Nanosecond timestamp of the last status_code change; monotonic
    /// non-decreasing per job
    pub status_code_updated_at: i64,
    /// Opaque cross-span correlation context
    pub trace_context: Option<String>,
}

impl Job {
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Test builder. Computes the deterministic ID from request + action unless
/// one is supplied explicitly.
#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    job: Job,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for JobBuilder {
    fn default() -> Self {
        Self {
            job: Job {
                id: String::new(),
                job_request_id: "test-request".into(),
                state: State::Pending,
                status_code: StatusCode::Created,
                status_message: None,
                repo_url: "https://github.com/test-org/study".into(),
                commit: "0000000000000000000000000000000000000000".into(),
                workspace: "test-workspace".into(),
                database_name: "dummy".into(),
                backend: "test-backend".into(),
                action: "action".into(),
                action_repo_url: None,
                action_commit: None,
                requires_outputs_from: Vec::new(),
                wait_for_job_ids: Vec::new(),
                run_command: "python:latest python analysis.py".into(),
                image_id: None,
                output_spec: OutputSpec::new(),
                outputs: BTreeMap::new(),
                unmatched_outputs: Vec::new(),
                unmatched_patterns: Vec::new(),
                cancelled: false,
                created_at: 1_000_000,
                updated_at: 1_000_000,
                started_at: None,
                completed_at: None,
                status_code_updated_at: 1_000_000_000_000_000,
                trace_context: None,
            },
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn id(mut self, v: impl Into<String>) -> Self {
        self.job.id = v.into();
        self
    }

    pub fn job_request_id(mut self, v: impl Into<String>) -> Self {
        self.job.job_request_id = v.into();
        self
    }

    pub fn action(mut self, v: impl Into<String>) -> Self {
        self.job.action = v.into();
        self
    }

    pub fn workspace(mut self, v: impl Into<String>) -> Self {
        self.job.workspace = v.into();
        self
    }

    pub fn backend(mut self, v: impl Into<String>) -> Self {
        self.job.backend = v.into();
        self
    }

    pub fn run_command(mut self, v: impl Into<String>) -> Self {
        self.job.run_command = v.into();
        self
    }

    pub fn status(mut self, code: StatusCode) -> Self {
        self.job.status_code = code;
        self.job.state = code.state();
        self
    }

    pub fn status_message(mut self, v: impl Into<String>) -> Self {
        self.job.status_message = Some(v.into());
        self
    }

    pub fn wait_for_job_ids(mut self, v: Vec<String>) -> Self {
        self.job.wait_for_job_ids = v;
        self
    }

    pub fn requires_outputs_from(mut self, v: Vec<String>) -> Self {
        self.job.requires_outputs_from = v;
        self
    }

    pub fn output_spec(mut self, v: OutputSpec) -> Self {
        self.job.output_spec = v;
        self
    }

    pub fn cancelled(mut self, v: bool) -> Self {
        self.job.cancelled = v;
        self
    }

    pub fn created_at(mut self, v: i64) -> Self {
        self.job.created_at = v;
        self.job.updated_at = v;
        self
    }

    pub fn build(mut self) -> Job {
        if self.job.id.is_empty() {
            self.job.id = deterministic_job_id(&self.job.job_request_id, &self.job.action);
        }
        self.job
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Job {
    /// Create a builder with test defaults.
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod job_tests;
