// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expanding a JobRequest into jobs with wait-for edges.
//!
//! The only public entry point is [`create_or_update_jobs`]. A broken
//! JobRequest never raises out of it: the error is captured into a single
//! synthetic job so it syncs back to the coordination server where the
//! study developer can see it.

use fm_core::{
    deterministic_job_id, Clock, Job, JobRequest, OutputSpec, State, StatusCode, ERROR_ACTION,
};
use fm_pipeline::{
    get_action_specification, parse_and_validate_project_file, resolve_reusable_action,
    validate_branch_and_commit, validate_repo_url, ActionSpecification, GitClient, GitError,
    Pipeline, RUN_ALL,
};
use fm_storage::{jobs, requests, Database, StorageError};
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::errors::ExpansionError;
use crate::workspace::{calculate_workspace_state, previous_outcome};

/// Status of an action encountered during the dependency walk.
enum ActionNode {
    /// A live or newly created job covers this action
    Scheduled { job_id: String },
    /// Previously succeeded; nothing to wait for
    AlreadyDone,
}

/// Create or update jobs in response to a JobRequest. Returns the number of
/// new jobs (0 for an already-processed request).
pub async fn create_or_update_jobs<C: Clock>(
    db: &Database,
    git: &dyn GitClient,
    config: &EngineConfig,
    clock: &C,
    request: &JobRequest,
) -> Result<usize, StorageError> {
    if db.jobs_exist_for_request(&request.id)? {
        if !request.cancelled_actions.is_empty() {
            tracing::debug!(request_id = %request.id, "cancelling actions");
            db.mark_jobs_cancelled(&request.id, &request.cancelled_actions)?;
        } else {
            tracing::debug!(request_id = %request.id, "ignoring already processed JobRequest");
        }
        return Ok(0);
    }

    tracing::info!(request_id = %request.id, workspace = %request.workspace, "handling new JobRequest");
    match create_jobs(db, git, config, clock, request).await {
        Ok(count) => {
            tracing::info!(request_id = %request.id, count, "created new jobs");
            Ok(count)
        }
        Err(CreateError::Storage(e)) => Err(e),
        Err(CreateError::Expansion(e)) => {
            tracing::info!(request_id = %request.id, error = %e, "JobRequest failed");
            create_failed_job(db, clock, request, &e)?;
            Ok(1)
        }
    }
}

enum CreateError {
    Expansion(ExpansionError),
    Storage(StorageError),
}

impl From<ExpansionError> for CreateError {
    fn from(e: ExpansionError) -> Self {
        CreateError::Expansion(e)
    }
}

impl From<StorageError> for CreateError {
    fn from(e: StorageError) -> Self {
        CreateError::Storage(e)
    }
}

async fn create_jobs<C: Clock>(
    db: &Database,
    git: &dyn GitClient,
    config: &EngineConfig,
    clock: &C,
    request: &JobRequest,
) -> Result<usize, CreateError> {
    validate_job_request(config, request)?;

    let commit = match &request.commit {
        Some(commit) => commit.clone(),
        None => git.resolve_ref(&request.repo_url, &request.branch).await.map_err(ExpansionError::Git)?,
    };

    // Talking to the remote is the expensive check, so it runs only once
    // everything local has passed
    if !config.allowed_github_orgs.is_empty() && !config.local_run_mode {
        validate_branch_and_commit(git, &request.repo_url, &commit, &request.branch)
            .await
            .map_err(ExpansionError::Github)?;
    }

    let project_file = match git.read_file(&request.repo_url, &commit, "project.yaml").await {
        Ok(contents) => contents,
        Err(GitError::FileNotFound { .. }) => {
            return Err(ExpansionError::JobRequest(format!(
                "No project.yaml file found in {}",
                request.repo_url
            ))
            .into());
        }
        Err(e) => return Err(ExpansionError::Git(e).into()),
    };
    let pipeline = parse_and_validate_project_file(&project_file).map_err(ExpansionError::Project)?;

    let active_jobs = db.active_jobs_for_workspace(&request.workspace)?;
    let workspace_state = calculate_workspace_state(db, &request.workspace)?;

    let mut new_jobs =
        get_jobs_to_run(config, clock, request, &commit, &pipeline, &active_jobs, &workspace_state)?;

    if new_jobs.is_empty() {
        if active_jobs.is_empty() {
            return Err(ExpansionError::NothingToDo.into());
        }
        return Err(ExpansionError::JobRequest(
            "All requested actions were already scheduled to run".to_string(),
        )
        .into());
    }

    // Rewrite any run commands that point at reusable actions; this talks
    // to git so happens outside the recursive walk
    for job in &mut new_jobs {
        let resolved =
            resolve_reusable_action(git, &config.actions, &job.action, &job.run_command)
                .await
                .map_err(ExpansionError::Reusable)?;
        job.run_command = resolved.run_command;
        job.action_repo_url = resolved.repo_url;
        job.action_commit = resolved.commit;
    }

    // There is a delay between reading the active jobs and inserting our
    // new ones, but this function is the only place jobs are created and
    // the process is single-threaded, so the only possible interleaving is
    // active jobs completing, which dependents handle on their first check.
    let count = new_jobs.len();
    db.transaction(|conn| {
        requests::insert(conn, &request.id, &request.original)?;
        for job in &new_jobs {
            jobs::insert(conn, job)?;
        }
        Ok(())
    })?;

    Ok(count)
}

#[allow(clippy::too_many_arguments)]
fn get_jobs_to_run<C: Clock>(
    config: &EngineConfig,
    clock: &C,
    request: &JobRequest,
    commit: &str,
    pipeline: &Pipeline,
    active_jobs: &[Job],
    workspace_state: &HashMap<String, Job>,
) -> Result<Vec<Job>, CreateError> {
    let actions_to_run: Vec<String> = if request.requested_actions.iter().any(|a| a == RUN_ALL) {
        pipeline.all_actions()
    } else {
        request.requested_actions.clone()
    };

    let mut nodes: HashMap<String, ActionNode> = active_jobs
        .iter()
        .map(|job| (job.action.clone(), ActionNode::Scheduled { job_id: job.id.clone() }))
        .collect();
    let mut new_jobs: IndexMap<String, Job> = IndexMap::new();

    for action in &actions_to_run {
        build_recursively(
            config,
            clock,
            request,
            commit,
            pipeline,
            workspace_state,
            &mut nodes,
            &mut new_jobs,
            action,
        )?;
    }

    Ok(new_jobs.into_values().collect())
}

/// Walk the action DAG, memoising per-action results in `nodes`. Cycles are
/// impossible: the pipeline model rejects unknown `needs` and the walk only
/// follows declared edges.
#[allow(clippy::too_many_arguments)]
fn build_recursively<C: Clock>(
    config: &EngineConfig,
    clock: &C,
    request: &JobRequest,
    commit: &str,
    pipeline: &Pipeline,
    workspace_state: &HashMap<String, Job>,
    nodes: &mut HashMap<String, ActionNode>,
    new_jobs: &mut IndexMap<String, Job>,
    action: &str,
) -> Result<(), CreateError> {
    if nodes.contains_key(action) {
        return Ok(());
    }

    if !action_needs_running(config, request, workspace_state, action)? {
        nodes.insert(action.to_string(), ActionNode::AlreadyDone);
        return Ok(());
    }

    let spec = get_action_specification(pipeline, action, config.using_dummy_data_backend)
        .map_err(ExpansionError::Project)?;

    let mut wait_for_job_ids = Vec::new();
    for required in &spec.needs {
        build_recursively(
            config,
            clock,
            request,
            commit,
            pipeline,
            workspace_state,
            nodes,
            new_jobs,
            required,
        )?;
        if let Some(ActionNode::Scheduled { job_id }) = nodes.get(required) {
            wait_for_job_ids.push(job_id.clone());
        }
    }

    let job = new_job(config, clock, request, commit, action, &spec, wait_for_job_ids);
    nodes.insert(action.to_string(), ActionNode::Scheduled { job_id: job.id.clone() });
    new_jobs.insert(action.to_string(), job);
    Ok(())
}

fn new_job<C: Clock>(
    config: &EngineConfig,
    clock: &C,
    request: &JobRequest,
    commit: &str,
    action: &str,
    spec: &ActionSpecification,
    wait_for_job_ids: Vec<String>,
) -> Job {
    let now = clock.epoch_secs();
    Job {
        id: deterministic_job_id(&request.id, action),
        job_request_id: request.id.clone(),
        state: State::Pending,
        status_code: StatusCode::Created,
        status_message: Some("Created".to_string()),
        repo_url: request.repo_url.clone(),
        commit: commit.to_string(),
        workspace: request.workspace.clone(),
        database_name: request.database_name.clone(),
        backend: config.backend.clone(),
        action: action.to_string(),
        action_repo_url: None,
        action_commit: None,
        requires_outputs_from: spec.needs.clone(),
        wait_for_job_ids,
        run_command: spec.run.clone(),
        image_id: None,
        output_spec: spec.outputs.clone(),
        outputs: Default::default(),
        unmatched_outputs: Vec::new(),
        unmatched_patterns: Vec::new(),
        cancelled: false,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
        status_code_updated_at: clock.epoch_ns(),
        trace_context: None,
    }
}

/// Does this action need to be run as part of this JobRequest?
fn action_needs_running(
    config: &EngineConfig,
    request: &JobRequest,
    workspace_state: &HashMap<String, Job>,
    action: &str,
) -> Result<bool, CreateError> {
    // Explicitly requested actions always run
    if request.requested_actions.iter().any(|a| a == action) {
        return Ok(true);
    }
    // It's a dependency; forcing dependencies forces it
    if request.force_run_dependencies {
        return Ok(true);
    }
    match previous_outcome(workspace_state, action) {
        // Ran successfully before, so nothing to do
        Some(true) => Ok(false),
        Some(false) => {
            if request.force_run_failed {
                Ok(true)
            } else {
                Err(ExpansionError::JobRequest(format!(
                    "{} failed on a previous run and must be re-run",
                    action
                ))
                .into())
            }
        }
        // Never run before
        None => Ok(true),
    }
}

fn validate_job_request(config: &EngineConfig, request: &JobRequest) -> Result<(), CreateError> {
    if request.workspace.is_empty() {
        return Err(ExpansionError::JobRequest("Workspace name cannot be blank".to_string()).into());
    }
    if request.requested_actions.is_empty() {
        return Err(
            ExpansionError::JobRequest("At least one action must be supplied".to_string()).into()
        );
    }
    // These are externally supplied strings that end up as paths, so
    // outside local runs we are much more restrictive
    if !config.local_run_mode
        && !request
            .workspace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ExpansionError::JobRequest(
            "Invalid workspace name (allowed are alphanumeric, dash and underscore)".to_string(),
        )
        .into());
    }
    if !config.using_dummy_data_backend {
        match config.database_urls.get(&request.database_name) {
            None => {
                let valid: Vec<&str> =
                    config.database_urls.keys().map(String::as_str).collect();
                return Err(ExpansionError::JobRequest(format!(
                    "Invalid database name '{}', allowed are: {}",
                    request.database_name,
                    valid.join(", ")
                ))
                .into());
            }
            Some(None) => {
                return Err(ExpansionError::JobRequest(format!(
                    "Database name '{}' is not currently defined for backend '{}'",
                    request.database_name, config.backend
                ))
                .into());
            }
            Some(Some(_)) => {}
        }
    }
    if !config.allowed_github_orgs.is_empty() && !config.local_run_mode {
        validate_repo_url(&request.repo_url, &config.allowed_github_orgs)
            .map_err(ExpansionError::Github)?;
    }
    Ok(())
}

/// The only way to tell the coordination server a JobRequest was broken is
/// to create a job carrying the message. `NothingToDo` is the one case
/// reported as a success.
fn create_failed_job<C: Clock>(
    db: &Database,
    clock: &C,
    request: &JobRequest,
    error: &ExpansionError,
) -> Result<(), StorageError> {
    let (state, status_code, action, message) = match error {
        ExpansionError::NothingToDo => (
            State::Succeeded,
            StatusCode::Succeeded,
            request
                .requested_actions
                .first()
                .cloned()
                .unwrap_or_else(|| ERROR_ACTION.to_string()),
            "All actions have already run".to_string(),
        ),
        other => (
            State::Failed,
            StatusCode::JobError,
            ERROR_ACTION.to_string(),
            format!("{}: {}", other.kind(), other),
        ),
    };

    let now = clock.epoch_secs();
    let job = Job {
        id: deterministic_job_id(&request.id, &action),
        job_request_id: request.id.clone(),
        state,
        status_code,
        status_message: Some(message),
        repo_url: request.repo_url.clone(),
        commit: request.commit.clone().unwrap_or_default(),
        workspace: request.workspace.clone(),
        database_name: request.database_name.clone(),
        backend: request.backend.clone(),
        action,
        action_repo_url: None,
        action_commit: None,
        requires_outputs_from: Vec::new(),
        wait_for_job_ids: Vec::new(),
        run_command: String::new(),
        image_id: None,
        output_spec: OutputSpec::new(),
        outputs: Default::default(),
        unmatched_outputs: Vec::new(),
        unmatched_patterns: Vec::new(),
        cancelled: false,
        created_at: now,
        updated_at: now,
        started_at: Some(now),
        completed_at: Some(now),
        status_code_updated_at: clock.epoch_ns(),
        trace_context: None,
    };

    db.transaction(|conn| {
        requests::insert(conn, &request.id, &request.original)?;
        jobs::insert(conn, &job)?;
        Ok(())
    })
}

#[cfg(test)]
#[path = "expand_tests.rs"]
mod expand_tests;
