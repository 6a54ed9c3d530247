// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fm_core::StatusCode;
use fm_storage::Database;

fn insert(db: &Database, action: &str, code: StatusCode, created_at: i64, cancelled: bool) -> Job {
    let mut job = Job::builder()
        .job_request_id(format!("r-{}", created_at))
        .action(action)
        .status(code)
        .created_at(created_at)
        .cancelled(cancelled)
        .build();
    if code == StatusCode::Succeeded {
        job.outputs.insert(format!("output/{}.csv", action), "highly_sensitive".to_string());
    }
    db.insert_job(&job).unwrap();
    job
}

#[test]
fn latest_job_per_action_wins() {
    let db = Database::in_memory().unwrap();
    insert(&db, "generate", StatusCode::NonzeroExit, 100, false);
    insert(&db, "generate", StatusCode::Succeeded, 200, false);
    insert(&db, "analyse", StatusCode::Succeeded, 100, false);

    let state = calculate_workspace_state(&db, "test-workspace").unwrap();
    assert_eq!(state["generate"].status_code, StatusCode::Succeeded);
    assert_eq!(state.len(), 2);

    assert_eq!(previous_outcome(&state, "generate"), Some(true));
    assert_eq!(previous_outcome(&state, "analyse"), Some(true));
    assert_eq!(previous_outcome(&state, "never_run"), None);
}

#[test]
fn cancelled_and_error_jobs_are_ignored() {
    let db = Database::in_memory().unwrap();
    insert(&db, "generate", StatusCode::Succeeded, 100, false);
    insert(&db, "generate", StatusCode::NonzeroExit, 200, true);
    insert(&db, fm_core::ERROR_ACTION, StatusCode::JobError, 300, false);

    let state = calculate_workspace_state(&db, "test-workspace").unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(previous_outcome(&state, "generate"), Some(true));
}

#[test]
fn failed_latest_run_reports_failure() {
    let db = Database::in_memory().unwrap();
    insert(&db, "generate", StatusCode::Succeeded, 100, false);
    insert(&db, "generate", StatusCode::NonzeroExit, 200, false);

    let state = calculate_workspace_state(&db, "test-workspace").unwrap();
    assert_eq!(previous_outcome(&state, "generate"), Some(false));
}

#[test]
fn input_files_come_from_successful_runs_only() {
    let db = Database::in_memory().unwrap();
    insert(&db, "generate", StatusCode::Succeeded, 100, false);
    insert(&db, "broken", StatusCode::NonzeroExit, 100, false);

    let state = calculate_workspace_state(&db, "test-workspace").unwrap();
    let inputs = input_files(&state, &["generate".to_string(), "broken".to_string()]);
    assert_eq!(inputs, ["output/generate.csv"]);
}
