// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::Database;
use fm_core::test_support::output_spec;
use fm_core::{Job, State, StatusCode};

fn database() -> Database {
    Database::in_memory().unwrap()
}

#[test]
fn insert_and_find_round_trip() {
    let db = database();
    let mut job = Job::builder()
        .job_request_id("r1")
        .action("generate_dataset")
        .output_spec(output_spec("highly_sensitive", "dataset", "output/*.csv"))
        .wait_for_job_ids(vec!["abc123".into()])
        .build();
    job.outputs.insert("output/ds.csv".into(), "highly_sensitive".into());
    job.status_message = Some("Created".into());

    db.insert_job(&job).unwrap();
    let found = db.job_by_id(&job.id).unwrap().unwrap();
    assert_eq!(found, job);
}

#[test]
fn update_overwrites_all_fields() {
    let db = database();
    let mut job = Job::builder().build();
    db.insert_job(&job).unwrap();

    job.state = State::Running;
    job.status_code = StatusCode::Executing;
    job.started_at = Some(2_000_000);
    job.image_id = Some("sha256:abcdef".into());
    db.update_job(&job).unwrap();

    let found = db.job_by_id(&job.id).unwrap().unwrap();
    assert_eq!(found.status_code, StatusCode::Executing);
    assert_eq!(found.started_at, Some(2_000_000));
    assert_eq!(found.image_id.as_deref(), Some("sha256:abcdef"));
}

#[test]
fn active_queries_exclude_terminal_jobs() {
    let db = database();
    db.insert_job(&Job::builder().action("a").status(StatusCode::Created).build()).unwrap();
    db.insert_job(&Job::builder().action("b").status(StatusCode::Executing).build()).unwrap();
    db.insert_job(&Job::builder().action("c").status(StatusCode::Succeeded).build()).unwrap();
    db.insert_job(&Job::builder().action("d").status(StatusCode::NonzeroExit).build()).unwrap();

    let active = db.active_jobs_for_backend("test-backend").unwrap();
    let actions: Vec<_> = active.iter().map(|j| j.action.as_str()).collect();
    assert_eq!(actions, ["a", "b"]);

    let active = db.active_jobs_for_workspace("test-workspace").unwrap();
    assert_eq!(active.len(), 2);
}

#[test]
fn active_jobs_are_fifo_by_created_at() {
    let db = database();
    db.insert_job(&Job::builder().action("late").created_at(300).build()).unwrap();
    db.insert_job(&Job::builder().action("early").created_at(100).build()).unwrap();
    db.insert_job(&Job::builder().action("middle").created_at(200).build()).unwrap();

    let active = db.active_jobs_for_backend("test-backend").unwrap();
    let actions: Vec<_> = active.iter().map(|j| j.action.as_str()).collect();
    assert_eq!(actions, ["early", "middle", "late"]);
}

#[test]
fn partial_id_lookup() {
    let db = database();
    let job = Job::builder().job_request_id("r1").action("a").build();
    db.insert_job(&job).unwrap();

    let matches = db.jobs_by_partial_id(&job.id[..6]).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, job.id);

    assert!(db.jobs_by_partial_id("zzzzzz").unwrap().is_empty());
}

#[test]
fn states_of_returns_states_for_ids() {
    let db = database();
    let done = Job::builder().action("done").status(StatusCode::Succeeded).build();
    let failed = Job::builder().action("failed").status(StatusCode::NonzeroExit).build();
    db.insert_job(&done).unwrap();
    db.insert_job(&failed).unwrap();

    let mut states =
        db.job_states_of(&[done.id.clone(), failed.id.clone()]).unwrap();
    states.sort_by_key(|s| s.to_string());
    assert_eq!(states, vec![State::Failed, State::Succeeded]);

    assert!(db.job_states_of(&[]).unwrap().is_empty());
}

#[test]
fn exists_for_request() {
    let db = database();
    assert!(!db.jobs_exist_for_request("r1").unwrap());
    db.insert_job(&Job::builder().job_request_id("r1").build()).unwrap();
    assert!(db.jobs_exist_for_request("r1").unwrap());
}

#[test]
fn mark_cancelled_targets_named_actions_only() {
    let db = database();
    db.insert_job(&Job::builder().job_request_id("r1").action("a").build()).unwrap();
    db.insert_job(&Job::builder().job_request_id("r1").action("b").build()).unwrap();
    db.insert_job(&Job::builder().job_request_id("r2").action("a").build()).unwrap();

    let updated = db.mark_jobs_cancelled("r1", &["a".into()]).unwrap();
    assert_eq!(updated, 1);

    let jobs = db.jobs_for_request("r1").unwrap();
    for job in jobs {
        assert_eq!(job.cancelled, job.action == "a");
    }
    // Other requests untouched
    assert!(db.jobs_for_request("r2").unwrap().iter().all(|j| !j.cancelled));
}

#[test]
fn jobs_for_requests_handles_multiple_ids() {
    let db = database();
    db.insert_job(&Job::builder().job_request_id("r1").action("a").build()).unwrap();
    db.insert_job(&Job::builder().job_request_id("r2").action("b").build()).unwrap();
    db.insert_job(&Job::builder().job_request_id("r3").action("c").build()).unwrap();

    let jobs = db.jobs_for_requests(&["r1".into(), "r3".into()]).unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(db.jobs_for_requests(&[]).unwrap().is_empty());
}
