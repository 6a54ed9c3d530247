// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The executor adapter interface.

use async_trait::async_trait;
use fm_core::{JobDefinition, JobResults, JobStatus, Privacy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Transient condition; the controller retries within its tick budget
    /// and escalates only after repeated failures.
    #[error("executor retry: {0}")]
    Retryable(String),
    /// Non-transient adapter failure. Fails the job with an internal error.
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for ExecutorError {
    fn from(e: std::io::Error) -> Self {
        ExecutorError::Failed(e.to_string())
    }
}

/// Drives one job's container lifecycle.
///
/// Calls are valid only from particular [`fm_core::ExecutorState`]s (noted
/// per method); the controller guarantees ordering, and implementations are
/// idempotent within a phase so a repeated call after a crash is harmless.
#[async_trait]
pub trait ExecutorApi: Send + Sync {
    /// Fetch study code, materialise inputs, build the job's ephemeral
    /// workspace volume. Valid from `Unknown`; idempotent while
    /// `Preparing`/`Prepared`.
    async fn prepare(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError>;

    /// Start the container. Valid from `Prepared`. Network access is
    /// allocated iff the definition allows it; database env is injected iff
    /// the job requires the database and the backend is not the dummy one.
    async fn execute(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError>;

    /// Collect logs and outputs, match them against the output spec, and
    /// record [`JobResults`]. Valid from `Executed`. Preserves the executed
    /// container and volume until `cleanup`.
    async fn finalize(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError>;

    /// Cancel in-flight work: an `Executing` job moves to `Executed` (the
    /// kill does not wait), a `Prepared` job straight to `Finalized` (there
    /// is no output to collect), a never-started job back to `Unknown`.
    async fn terminate(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError>;

    /// Destroy container and volume, returning the job to `Unknown`.
    async fn cleanup(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError>;

    /// Single source of truth for the job's current phase. Called every
    /// tick, so must be cheap.
    async fn get_status(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError>;

    /// Results of a finalized job; `None` unless the state is `Finalized`.
    async fn get_results(&self, job: &JobDefinition) -> Result<Option<JobResults>, ExecutorError>;

    /// Best-effort out-of-band file removal from a workspace. Returns the
    /// files actually deleted.
    async fn delete_files(
        &self,
        workspace: &str,
        privacy: Privacy,
        paths: &[String],
    ) -> Result<Vec<String>, ExecutorError>;
}
