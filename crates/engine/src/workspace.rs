// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! What has previously happened in a workspace.

use fm_core::{Job, State, ERROR_ACTION};
use fm_storage::{Database, StorageError};
use std::collections::HashMap;

/// The latest non-cancelled job per action in `workspace`, excluding the
/// synthetic error action. Ties on `created_at` break toward the newer row.
pub fn calculate_workspace_state(
    db: &Database,
    workspace: &str,
) -> Result<HashMap<String, Job>, StorageError> {
    let mut latest: HashMap<String, Job> = HashMap::new();
    for job in db.jobs_for_workspace(workspace)? {
        if job.cancelled || job.action == ERROR_ACTION {
            continue;
        }
        match latest.get(&job.action) {
            Some(existing) if existing.created_at > job.created_at => {}
            _ => {
                latest.insert(job.action.clone(), job);
            }
        }
    }
    Ok(latest)
}

/// Outcome of the last run of `action`: `Some(true)` succeeded,
/// `Some(false)` failed, `None` never completed a run.
pub fn previous_outcome(state: &HashMap<String, Job>, action: &str) -> Option<bool> {
    match state.get(action).map(|job| job.state) {
        Some(State::Succeeded) => Some(true),
        Some(State::Failed) => Some(false),
        _ => None,
    }
}

/// Output files of the last successful run of each of `actions`, used as
/// the inputs of a dependent job.
pub fn input_files(state: &HashMap<String, Job>, actions: &[String]) -> Vec<String> {
    let mut files = Vec::new();
    for action in actions {
        if let Some(job) = state.get(action) {
            if job.state == State::Succeeded {
                files.extend(job.outputs.keys().cloned());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod workspace_tests;
