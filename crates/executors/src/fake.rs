// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory executor for state machine and scenario tests.
//!
//! Phases auto-advance one step per `get_status` poll (Preparing →
//! Prepared, Executing → Executed, Finalizing → Finalized) so multi-tick
//! progressions are deterministic. Individual jobs can be held in place,
//! given canned results, or made to fail transiently.

use async_trait::async_trait;
use fm_core::{ExecutorState, JobDefinition, JobResults, JobStatus, Privacy};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{ExecutorApi, ExecutorError};

#[derive(Default)]
struct FakeState {
    states: HashMap<String, ExecutorState>,
    results: HashMap<String, JobResults>,
    scripted_results: HashMap<String, JobResults>,
    held: std::collections::HashSet<String>,
    retries_remaining: HashMap<String, u32>,
    calls: Vec<String>,
    deleted_files: Vec<(String, Privacy, Vec<String>)>,
}

#[derive(Clone, Default)]
pub struct FakeExecutor {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results to report when `job_id` finalizes. Defaults to a clean exit
    /// with no outputs.
    pub fn set_results(&self, job_id: &str, results: JobResults) {
        self.inner.lock().scripted_results.insert(job_id.to_string(), results);
    }

    /// Stop `job_id` auto-advancing (e.g. keep it Executing across ticks).
    pub fn hold(&self, job_id: &str) {
        self.inner.lock().held.insert(job_id.to_string());
    }

    pub fn release(&self, job_id: &str) {
        self.inner.lock().held.remove(job_id);
    }

    /// Make the next `count` `get_status` calls for `job_id` fail with a
    /// retryable error.
    pub fn fail_status_times(&self, job_id: &str, count: u32) {
        self.inner.lock().retries_remaining.insert(job_id.to_string(), count);
    }

    /// Force a state, e.g. to simulate an executor inconsistency.
    pub fn set_state(&self, job_id: &str, state: ExecutorState) {
        self.inner.lock().states.insert(job_id.to_string(), state);
    }

    pub fn state_of(&self, job_id: &str) -> ExecutorState {
        *self.inner.lock().states.get(job_id).unwrap_or(&ExecutorState::Unknown)
    }

    /// Method-call log, e.g. `["prepare abc", "get_status abc"]`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    pub fn deleted_files(&self) -> Vec<(String, Privacy, Vec<String>)> {
        self.inner.lock().deleted_files.clone()
    }

    fn record(&self, method: &str, job_id: &str) {
        self.inner.lock().calls.push(format!("{} {}", method, job_id));
    }

    fn current(&self, job_id: &str) -> ExecutorState {
        self.state_of(job_id)
    }

    fn transition(&self, job_id: &str, state: ExecutorState) {
        self.inner.lock().states.insert(job_id.to_string(), state);
    }

    fn default_results(&self, job_id: &str) -> JobResults {
        let inner = self.inner.lock();
        inner.scripted_results.get(job_id).cloned().unwrap_or(JobResults {
            exit_code: 0,
            image_id: "sha256:fake".to_string(),
            ..JobResults::default()
        })
    }
}

#[async_trait]
impl ExecutorApi for FakeExecutor {
    async fn prepare(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.record("prepare", &job.id);
        match self.current(&job.id) {
            ExecutorState::Unknown => {
                self.transition(&job.id, ExecutorState::Preparing);
                Ok(JobStatus::new(ExecutorState::Preparing))
            }
            state @ (ExecutorState::Preparing | ExecutorState::Prepared) => {
                Ok(JobStatus::new(state))
            }
            other => Err(ExecutorError::Failed(format!("cannot prepare from {}", other))),
        }
    }

    async fn execute(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.record("execute", &job.id);
        match self.current(&job.id) {
            ExecutorState::Prepared => {
                self.transition(&job.id, ExecutorState::Executing);
                Ok(JobStatus::new(ExecutorState::Executing))
            }
            other => Err(ExecutorError::Failed(format!("cannot execute from {}", other))),
        }
    }

    async fn finalize(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.record("finalize", &job.id);
        match self.current(&job.id) {
            ExecutorState::Executed => {
                let results = self.default_results(&job.id);
                let mut inner = self.inner.lock();
                inner.results.insert(job.id.clone(), results);
                inner.states.insert(job.id.clone(), ExecutorState::Finalizing);
                Ok(JobStatus::new(ExecutorState::Finalizing))
            }
            other => Err(ExecutorError::Failed(format!("cannot finalize from {}", other))),
        }
    }

    async fn terminate(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.record("terminate", &job.id);
        let state = match self.current(&job.id) {
            ExecutorState::Executing => ExecutorState::Executed,
            ExecutorState::Prepared => {
                let mut inner = self.inner.lock();
                let results = JobResults {
                    exit_code: 137,
                    message: Some("Cancelled by user".to_string()),
                    ..JobResults::default()
                };
                inner.results.insert(job.id.clone(), results);
                ExecutorState::Finalized
            }
            ExecutorState::Unknown | ExecutorState::Preparing => ExecutorState::Unknown,
            other => other,
        };
        self.transition(&job.id, state);
        Ok(JobStatus::new(state))
    }

    async fn cleanup(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.record("cleanup", &job.id);
        self.transition(&job.id, ExecutorState::Unknown);
        Ok(JobStatus::new(ExecutorState::Unknown))
    }

    async fn get_status(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        {
            let mut inner = self.inner.lock();
            if let Some(remaining) = inner.retries_remaining.get_mut(&job.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ExecutorError::Retryable("fake transient failure".to_string()));
                }
            }
            inner.calls.push(format!("get_status {}", job.id));

            let current =
                *inner.states.get(&job.id).unwrap_or(&ExecutorState::Unknown);
            if !inner.held.contains(&job.id) {
                let advanced = match current {
                    ExecutorState::Preparing => Some(ExecutorState::Prepared),
                    ExecutorState::Executing => Some(ExecutorState::Executed),
                    ExecutorState::Finalizing => Some(ExecutorState::Finalized),
                    _ => None,
                };
                if let Some(next) = advanced {
                    inner.states.insert(job.id.clone(), next);
                    return Ok(JobStatus::new(next));
                }
            }
            Ok(JobStatus::new(current))
        }
    }

    async fn get_results(&self, job: &JobDefinition) -> Result<Option<JobResults>, ExecutorError> {
        let inner = self.inner.lock();
        let state = *inner.states.get(&job.id).unwrap_or(&ExecutorState::Unknown);
        if state != ExecutorState::Finalized {
            return Ok(None);
        }
        Ok(inner.results.get(&job.id).cloned())
    }

    async fn delete_files(
        &self,
        workspace: &str,
        privacy: Privacy,
        paths: &[String],
    ) -> Result<Vec<String>, ExecutorError> {
        self.inner.lock().deleted_files.push((
            workspace.to_string(),
            privacy,
            paths.to_vec(),
        ));
        Ok(paths.to_vec())
    }
}

/// Convenience used by tests: results describing a successful run with the
/// given outputs.
pub fn success_results(outputs: &[(&str, &str)]) -> JobResults {
    JobResults {
        outputs: outputs
            .iter()
            .map(|(file, privacy)| (file.to_string(), privacy.to_string()))
            .collect::<BTreeMap<_, _>>(),
        exit_code: 0,
        image_id: "sha256:fake".to_string(),
        ..JobResults::default()
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod fake_tests;
