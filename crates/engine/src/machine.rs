// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job state machine: one tick moves one job at most one step.

use fm_core::{
    Clock, ExecutorState, Job, JobDefinition, JobResults, State, StatusCode, Study, Task, TaskType,
};
use fm_executors::{ExecutorApi, ExecutorError};
use fm_pipeline::is_extraction_command;
use fm_storage::StorageError;

use crate::run_loop::{Engine, TickFlags};
use crate::spans;
use crate::workspace::{calculate_workspace_state, input_files};

/// Consecutive transient executor failures tolerated per job before the
/// job is failed.
const MAX_EXECUTOR_RETRIES: u32 = 3;

impl<E: ExecutorApi, C: Clock> Engine<E, C> {
    /// Advance one job by at most one step.
    pub(crate) async fn handle_job(
        &self,
        job: &mut Job,
        flags: &TickFlags,
        running_cost: &mut f64,
    ) -> Result<(), StorageError> {
        let definition = match self.base_definition(job) {
            Ok(definition) => definition,
            Err(message) => return self.fail_internal(job, &definition_error(&message)).await,
        };

        let status = match self.executor.get_status(&definition).await {
            Ok(status) => {
                self.retries.lock().remove(&job.id);
                status
            }
            Err(ExecutorError::Retryable(message)) => {
                return self.note_retry(job, &message).await;
            }
            Err(ExecutorError::Failed(message)) => {
                return self.fail_internal(job, &message).await;
            }
        };

        // Cancellation short-circuits everything else
        if job.cancelled {
            return self.handle_cancelled(job, &definition, status.state).await;
        }

        // Database maintenance preempts any DB-using job that has reached
        // the database-facing phases; it re-enters the queue afterwards
        if flags.db_maintenance
            && definition.requires_db
            && matches!(
                status.state,
                ExecutorState::Executing | ExecutorState::Executed | ExecutorState::Finalizing
            )
        {
            tracing::warn!(job_id = %job.id, "preempting job for database maintenance");
            self.call_executor(job, self.executor.terminate(&definition)).await?;
            self.call_executor(job, self.executor.cleanup(&definition)).await?;
            self.deactivate_run_task(job)?;
            job.started_at = None;
            return self.set_code(
                job,
                StatusCode::WaitingDbMaintenance,
                "Waiting for database maintenance to finish",
            );
        }

        if status.state == ExecutorState::Error {
            let message = status.message.as_deref().unwrap_or("Executor error");
            return self.fail_internal(job, message).await;
        }

        match job.state {
            State::Pending => {
                self.handle_pending(job, &definition, status.state, flags, running_cost).await
            }
            State::Running => self.handle_running(job, &definition, status.state).await,
            // Terminal jobs are never loaded by the tick query
            State::Failed | State::Succeeded => Ok(()),
        }
    }

    async fn handle_pending(
        &self,
        job: &mut Job,
        definition: &JobDefinition,
        observed: ExecutorState,
        flags: &TickFlags,
        running_cost: &mut f64,
    ) -> Result<(), StorageError> {
        match observed {
            ExecutorState::Unknown => {}
            // A crash between kicking off preparation and persisting the
            // status change lands here; adopt the executor's view
            ExecutorState::Preparing => {
                self.ensure_run_task(job, definition)?;
                *running_cost += self.config.weight(&job.action);
                return self.set_code(job, StatusCode::Preparing, "Preparing");
            }
            ExecutorState::Prepared => {
                self.ensure_run_task(job, definition)?;
                *running_cost += self.config.weight(&job.action);
                return self.set_code(job, StatusCode::Prepared, "Prepared, waiting to run");
            }
            other => return self.invalid_transition(job, other).await,
        }

        let awaited = self.db.job_states_of(&job.wait_for_job_ids)?;
        if awaited.iter().any(|state| *state == State::Failed) {
            self.deactivate_run_task(job)?;
            return self.set_code(
                job,
                StatusCode::DependencyFailed,
                "Not starting as dependency failed",
            );
        }
        if awaited.len() < job.wait_for_job_ids.len()
            || awaited.iter().any(|state| *state != State::Succeeded)
        {
            if self.dependency_wait_expired(job, awaited.len()) {
                return self.fail_internal(job, "Waited too long on dependencies").await;
            }
            return self.set_code(
                job,
                StatusCode::WaitingOnDependencies,
                "Waiting on dependencies",
            );
        }

        if flags.db_maintenance && self.requires_db(job) {
            return self.set_code(
                job,
                StatusCode::WaitingDbMaintenance,
                "Waiting for database maintenance to finish",
            );
        }
        if flags.paused {
            return self.set_code(
                job,
                StatusCode::WaitingPaused,
                "Backend is currently paused",
            );
        }
        let weight = self.config.weight(&job.action);
        if *running_cost + weight > self.config.max_workers {
            return self.set_code(job, StatusCode::WaitingOnWorkers, "Waiting on available workers");
        }

        // All gates open: add the input files from prior actions and kick
        // off preparation
        let mut definition = definition.clone();
        let workspace_state = calculate_workspace_state(&self.db, &job.workspace)?;
        definition.inputs = input_files(&workspace_state, &job.requires_outputs_from);
        match self.executor.prepare(&definition).await {
            Ok(status) => {
                let code = match status.state {
                    ExecutorState::Prepared => StatusCode::Prepared,
                    _ => StatusCode::Preparing,
                };
                self.ensure_run_task(job, &definition)?;
                *running_cost += weight;
                self.set_code(job, code, "Preparing")
            }
            Err(ExecutorError::Retryable(message)) => self.note_retry(job, &message).await,
            Err(ExecutorError::Failed(message)) => self.fail_internal(job, &message).await,
        }
    }

    async fn handle_running(
        &self,
        job: &mut Job,
        definition: &JobDefinition,
        observed: ExecutorState,
    ) -> Result<(), StorageError> {
        let expected = match job.status_code.executor_state() {
            Some(expected) => expected,
            None => return self.invalid_transition(job, observed).await,
        };
        if observed != expected && Some(observed) != next_lifecycle_state(expected) {
            return self.invalid_transition(job, observed).await;
        }

        match observed {
            ExecutorState::Preparing => self.set_code(job, StatusCode::Preparing, "Preparing"),
            ExecutorState::Prepared => {
                self.set_code(job, StatusCode::Prepared, "Prepared, waiting to run")?;
                match self.executor.execute(definition).await {
                    Ok(_) => self.set_code(job, StatusCode::Executing, "Executing job on backend"),
                    Err(ExecutorError::Retryable(message)) => self.note_retry(job, &message).await,
                    Err(ExecutorError::Failed(message)) => self.fail_internal(job, &message).await,
                }
            }
            ExecutorState::Executing => {
                self.set_code(job, StatusCode::Executing, "Executing job on backend")
            }
            ExecutorState::Executed => {
                self.set_code(job, StatusCode::Executed, "Finished executing")?;
                match self.executor.finalize(definition).await {
                    Ok(status) => {
                        let code = match status.state {
                            ExecutorState::Finalized => StatusCode::Finalized,
                            _ => StatusCode::Finalizing,
                        };
                        self.set_code(job, code, "Recording job results")
                    }
                    Err(ExecutorError::Retryable(message)) => self.note_retry(job, &message).await,
                    Err(ExecutorError::Failed(message)) => self.fail_internal(job, &message).await,
                }
            }
            ExecutorState::Finalizing => {
                self.set_code(job, StatusCode::Finalizing, "Recording job results")
            }
            ExecutorState::Finalized => self.complete_finalized(job, definition).await,
            ExecutorState::Unknown | ExecutorState::Error => {
                self.invalid_transition(job, observed).await
            }
        }
    }

    /// Read results, classify the outcome, clean up.
    async fn complete_finalized(
        &self,
        job: &mut Job,
        definition: &JobDefinition,
    ) -> Result<(), StorageError> {
        let results = match self.executor.get_results(definition).await {
            Ok(Some(results)) => results,
            Ok(None) => {
                return self.fail_internal(job, "Executor reported no results for finalized job").await
            }
            Err(ExecutorError::Retryable(message)) => return self.note_retry(job, &message).await,
            Err(ExecutorError::Failed(message)) => return self.fail_internal(job, &message).await,
        };

        self.apply_results(job, &results);
        self.call_executor(job, self.executor.cleanup(definition)).await?;
        self.deactivate_run_task(job)?;

        if results.exit_code == 0 && results.unmatched_patterns.is_empty() {
            self.set_code(job, StatusCode::Succeeded, "Completed successfully")
        } else if results.exit_code == 0 {
            let mut message = "No outputs found matching patterns".to_string();
            if let Some(hint) = &results.hint {
                message = format!("{}:\n{}", message, hint);
            }
            self.set_code(job, StatusCode::UnmatchedPatterns, message)
        } else {
            let mut message = format!("Job exited with an error code ({})", results.exit_code);
            if let Some(extra) = &results.message {
                message = format!("{}: {}", message, extra);
            }
            self.set_code(job, StatusCode::NonzeroExit, message)
        }
    }

    async fn handle_cancelled(
        &self,
        job: &mut Job,
        definition: &JobDefinition,
        observed: ExecutorState,
    ) -> Result<(), StorageError> {
        match observed {
            // Never started: nothing to tear down
            ExecutorState::Unknown => {
                self.deactivate_run_task(job)?;
                self.set_code(job, StatusCode::CancelledByUser, "Cancelled by user")
            }
            ExecutorState::Preparing => {
                // Terminate drops the half-built workspace; next tick
                // observes Unknown and finishes the job off
                self.call_executor(job, self.executor.terminate(definition)).await?;
                Ok(())
            }
            ExecutorState::Prepared => {
                self.call_executor(job, self.executor.terminate(definition)).await?;
                self.call_executor(job, self.executor.cleanup(definition)).await?;
                self.deactivate_run_task(job)?;
                self.set_code(job, StatusCode::CancelledByUser, "Cancelled by user")
            }
            ExecutorState::Executing => {
                // Does not wait: the next tick observes Executed
                self.call_executor(job, self.executor.terminate(definition)).await?;
                Ok(())
            }
            ExecutorState::Executed | ExecutorState::Finalizing | ExecutorState::Finalized => {
                if observed == ExecutorState::Executed {
                    // Collect the log for the study developer before the
                    // container goes away
                    let _ = self.executor.finalize(definition).await;
                }
                self.call_executor(job, self.executor.cleanup(definition)).await?;
                self.deactivate_run_task(job)?;
                self.set_code(job, StatusCode::CancelledByUser, "Cancelled whilst executing")
            }
            ExecutorState::Error => {
                self.call_executor(job, self.executor.cleanup(definition)).await?;
                self.deactivate_run_task(job)?;
                self.set_code(job, StatusCode::CancelledByUser, "Cancelled by user")
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// The definition used for status queries; inputs are only computed
    /// when a job is about to prepare.
    pub(crate) fn base_definition(&self, job: &Job) -> Result<JobDefinition, String> {
        let parts = shlex::split(&job.run_command)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| format!("unparseable run command: {}", job.run_command))?;
        let requires_db = is_extraction_command(&parts);
        Ok(JobDefinition {
            id: job.id.clone(),
            job_request_id: job.job_request_id.clone(),
            study: Study { repo_url: job.repo_url.clone(), commit: job.commit.clone() },
            workspace: job.workspace.clone(),
            action: job.action.clone(),
            created_at: job.created_at,
            image: parts[0].clone(),
            args: parts[1..].to_vec(),
            env: Default::default(),
            inputs: Vec::new(),
            output_spec: job.output_spec.clone(),
            allow_network_access: requires_db && !self.config.using_dummy_data_backend,
            requires_db,
            database_name: Some(job.database_name.clone()).filter(|name| !name.is_empty()),
            cancelled: job.cancelled,
        })
    }

    fn requires_db(&self, job: &Job) -> bool {
        shlex::split(&job.run_command)
            .map(|parts| is_extraction_command(&parts))
            .unwrap_or(false)
    }

    /// Count a transient failure; escalate after the bound.
    async fn note_retry(&self, job: &mut Job, message: &str) -> Result<(), StorageError> {
        let attempts = {
            let mut retries = self.retries.lock();
            let attempts = retries.entry(job.id.clone()).or_insert(0);
            *attempts += 1;
            *attempts
        };
        if attempts > MAX_EXECUTOR_RETRIES {
            self.retries.lock().remove(&job.id);
            return self
                .fail_internal(job, &format!("Executor kept failing: {}", message))
                .await;
        }
        tracing::warn!(
            job_id = %job.id,
            attempts,
            error = message,
            "transient executor failure, leaving job unchanged"
        );
        Ok(())
    }

    async fn invalid_transition(
        &self,
        job: &mut Job,
        observed: ExecutorState,
    ) -> Result<(), StorageError> {
        let message = format!(
            "Invalid transition: executor reported {} while job was {}",
            observed, job.status_code
        );
        tracing::error!(job_id = %job.id, %observed, status = %job.status_code, "invalid executor transition");
        self.fail_internal(job, &message).await
    }

    /// Terminal failure with best-effort teardown.
    async fn fail_internal(&self, job: &mut Job, message: &str) -> Result<(), StorageError> {
        if let Ok(definition) = self.base_definition(job) {
            let _ = self.executor.terminate(&definition).await;
            let _ = self.executor.cleanup(&definition).await;
        }
        self.deactivate_run_task(job)?;
        self.set_code(job, StatusCode::InternalError, format!("Internal error: {}", message))
    }

    /// Synchronous variant for the panic handler in the tick loop.
    pub(crate) fn force_fail(&self, job: &mut Job, message: &str) -> Result<(), StorageError> {
        self.deactivate_run_task(job)?;
        self.set_code(job, StatusCode::InternalError, format!("Internal error: {}", message))
    }

    /// Run a teardown executor call where failure must not mask the state
    /// change being made.
    async fn call_executor(
        &self,
        job: &Job,
        call: impl std::future::Future<Output = Result<fm_core::JobStatus, ExecutorError>>,
    ) -> Result<(), StorageError> {
        if let Err(e) = call.await {
            tracing::warn!(job_id = %job.id, error = %e, "executor teardown call failed");
        }
        Ok(())
    }

    fn apply_results(&self, job: &mut Job, results: &JobResults) {
        job.outputs = results.outputs.clone();
        job.unmatched_patterns = results.unmatched_patterns.clone();
        job.unmatched_outputs = results.unmatched_outputs.clone();
        if !results.image_id.is_empty() {
            job.image_id = Some(results.image_id.clone());
        }
    }

    fn dependency_wait_expired(&self, job: &Job, awaited_found: usize) -> bool {
        if job.status_code != StatusCode::WaitingOnDependencies {
            return false;
        }
        // Dependencies that still exist and are active are making
        // progress; only a wait with nothing left to wait on can be stuck
        if awaited_found == job.wait_for_job_ids.len() {
            return false;
        }
        let waited = self.clock.epoch_secs() - job.status_code_updated_at / 1_000_000_000;
        waited > self.config.stuck_job_timeout.as_secs() as i64
    }

    /// Record a run task for the job unless one is already active.
    fn ensure_run_task(&self, job: &Job, definition: &JobDefinition) -> Result<(), StorageError> {
        if self.db.active_run_job_task(&job.id)?.is_some() {
            return Ok(());
        }
        let task = Task {
            id: Task::run_job_id(&job.id),
            task_type: TaskType::RunJob,
            active: true,
            backend: self.config.backend.clone(),
            created_at: self.clock.epoch_secs(),
            finished_at: None,
            definition: serde_json::to_value(definition).unwrap_or(serde_json::Value::Null),
            results: None,
        };
        self.db.insert_task(&task)
    }

    pub(crate) fn deactivate_run_task(&self, job: &Job) -> Result<(), StorageError> {
        self.db.deactivate_task(&Task::run_job_id(&job.id), self.clock.epoch_secs())
    }

    /// Persist a status change; no-op when nothing would change.
    pub(crate) fn set_code(
        &self,
        job: &mut Job,
        code: StatusCode,
        message: impl Into<String>,
    ) -> Result<(), StorageError> {
        let message = message.into();
        let now = self.clock.epoch_secs();
        let now_ns = self.clock.epoch_ns();

        if job.status_code == code && job.status_message.as_deref() == Some(message.as_str()) {
            // Refresh updated_at occasionally so watchers can tell the
            // controller is alive without writing every tick
            if now - job.updated_at >= 60 {
                job.updated_at = now;
                self.db.update_job(job)?;
            }
            return Ok(());
        }

        spans::record_status_span(job, job.status_code, code, now_ns);

        let was_pending = job.state == State::Pending;
        job.status_code = code;
        job.state = code.state();
        job.status_message = Some(message.clone());
        job.updated_at = now;
        // Monotonic per job even if the clock steps backwards
        job.status_code_updated_at = now_ns.max(job.status_code_updated_at);

        if was_pending && job.state == State::Running && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if job.state.is_terminal() {
            if job.completed_at.is_none() {
                job.completed_at = Some(now);
            }
            spans::record_job_span(job, now_ns);
            self.retries.lock().remove(&job.id);
        }

        self.db.update_job(job)?;
        tracing::info!(job_id = %job.id, status = %code, "{}", message);
        Ok(())
    }

}

fn next_lifecycle_state(state: ExecutorState) -> Option<ExecutorState> {
    match state {
        ExecutorState::Unknown => Some(ExecutorState::Preparing),
        ExecutorState::Preparing => Some(ExecutorState::Prepared),
        ExecutorState::Prepared => Some(ExecutorState::Executing),
        ExecutorState::Executing => Some(ExecutorState::Executed),
        ExecutorState::Executed => Some(ExecutorState::Finalizing),
        ExecutorState::Finalizing => Some(ExecutorState::Finalized),
        ExecutorState::Finalized | ExecutorState::Error => None,
    }
}

fn definition_error(message: &str) -> String {
    format!("Could not build job definition: {}", message)
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod machine_tests;
