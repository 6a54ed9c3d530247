// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{test_context, test_context_with, BACKEND};
use crate::EngineConfig;
use fm_core::{FLAG_MODE, FLAG_PAUSED};
use fm_executors::fake::success_results;
use std::time::Duration;

#[tokio::test]
async fn happy_path_runs_to_success() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("generate_dataset");
    ctx.executor.set_results(&job.id, success_results(&[("output/ds.csv", "highly_sensitive")]));

    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Preparing);
    let started = ctx.job(&job.id).started_at;
    assert!(started.is_some());

    ctx.tick().await; // Prepared observed, execute called
    assert_eq!(ctx.status_of(&job.id), StatusCode::Executing);

    ctx.tick().await; // Executed observed, finalize called
    assert_eq!(ctx.status_of(&job.id), StatusCode::Finalizing);

    ctx.tick().await; // Finalized observed, results classified
    let finished = ctx.job(&job.id);
    assert_eq!(finished.status_code, StatusCode::Succeeded);
    assert_eq!(finished.state, State::Succeeded);
    assert_eq!(finished.status_message.as_deref(), Some("Completed successfully"));
    assert_eq!(finished.outputs.get("output/ds.csv").unwrap(), "highly_sensitive");
    assert_eq!(finished.image_id.as_deref(), Some("sha256:fake"));
    assert!(finished.completed_at.is_some());
    assert!(finished.created_at <= finished.started_at.unwrap());
    assert!(finished.started_at.unwrap() <= finished.completed_at.unwrap());

    // Cleanup returned the executor to Unknown
    assert_eq!(ctx.executor.state_of(&job.id), ExecutorState::Unknown);
}

#[tokio::test]
async fn waits_for_dependencies_then_starts() {
    let ctx = test_context();
    let dep = ctx.insert_pending_job("generate");
    // Created (and therefore processed) before its dependency each tick
    let mut dependent =
        Job::builder().backend(BACKEND).action("analyse").created_at(999_000).build();
    dependent.wait_for_job_ids = vec![dep.id.clone()];
    ctx.db.insert_job(&dependent).unwrap();

    ctx.tick().await;
    assert_eq!(ctx.status_of(&dep.id), StatusCode::Preparing);
    assert_eq!(ctx.status_of(&dependent.id), StatusCode::WaitingOnDependencies);

    // Drive the dependency to completion
    ctx.tick_n(3).await;
    assert_eq!(ctx.status_of(&dep.id), StatusCode::Succeeded);

    // Dependency succeeded before the dependent ever started
    ctx.tick().await;
    assert_eq!(ctx.status_of(&dependent.id), StatusCode::Preparing);
}

#[tokio::test]
async fn dependency_failure_fails_the_dependent() {
    let ctx = test_context();
    let failed = Job::builder().backend(BACKEND).action("generate").status(StatusCode::NonzeroExit).build();
    ctx.db.insert_job(&failed).unwrap();
    let mut dependent = Job::builder().backend(BACKEND).action("analyse").build();
    dependent.wait_for_job_ids = vec![failed.id.clone()];
    ctx.db.insert_job(&dependent).unwrap();

    ctx.tick().await;
    let job = ctx.job(&dependent.id);
    assert_eq!(job.status_code, StatusCode::DependencyFailed);
    assert_eq!(job.status_message.as_deref(), Some("Not starting as dependency failed"));
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn paused_backend_holds_jobs() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");
    ctx.db.set_flag(FLAG_PAUSED, Some("true"), BACKEND, 1).unwrap();

    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::WaitingPaused);

    ctx.db.set_flag(FLAG_PAUSED, None, BACKEND, 2).unwrap();
    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Preparing);
}

#[tokio::test]
async fn worker_budget_is_respected_within_a_tick() {
    let mut config = EngineConfig::for_backend(BACKEND);
    config.max_workers = 1.0;
    let ctx = test_context_with(config);

    let first = Job::builder().backend(BACKEND).action("first").created_at(100).build();
    let second = Job::builder().backend(BACKEND).action("second").created_at(200).build();
    ctx.db.insert_job(&first).unwrap();
    ctx.db.insert_job(&second).unwrap();

    ctx.tick().await;
    // The just-started first job counts against the budget immediately
    assert_eq!(ctx.status_of(&first.id), StatusCode::Preparing);
    assert_eq!(ctx.status_of(&second.id), StatusCode::WaitingOnWorkers);
}

#[tokio::test]
async fn action_weights_scale_the_budget() {
    let mut config = EngineConfig::for_backend(BACKEND);
    config.max_workers = 3.0;
    config.job_cpu_weights.insert("heavy".to_string(), 2.5);
    let ctx = test_context_with(config);

    let heavy = Job::builder().backend(BACKEND).action("heavy").created_at(100).build();
    let light = Job::builder().backend(BACKEND).action("light").created_at(200).build();
    ctx.db.insert_job(&heavy).unwrap();
    ctx.db.insert_job(&light).unwrap();

    ctx.tick().await;
    assert_eq!(ctx.status_of(&heavy.id), StatusCode::Preparing);
    // 2.5 + 1.0 > 3.0
    assert_eq!(ctx.status_of(&light.id), StatusCode::WaitingOnWorkers);
}

#[tokio::test]
async fn cancelling_a_pending_job_fails_it_immediately() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");
    ctx.cancel_job(&job.id);

    ctx.tick().await;
    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::CancelledByUser);
    assert_eq!(job.status_message.as_deref(), Some("Cancelled by user"));
}

#[tokio::test]
async fn cancelling_mid_execution_terminates_and_fails() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");

    ctx.tick_n(2).await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Executing);
    ctx.executor.hold(&job.id);
    ctx.cancel_job(&job.id);

    // First tick terminates (executor moves to Executed, does not wait)
    ctx.tick().await;
    assert_eq!(ctx.executor.state_of(&job.id), ExecutorState::Executed);
    assert!(ctx.job(&job.id).is_active());

    // Next tick observes Executed and completes the cancellation
    ctx.tick().await;
    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::CancelledByUser);
    assert!(job.status_message.unwrap().contains("Cancelled whilst executing"));
    assert_eq!(ctx.executor.state_of(&job.id), ExecutorState::Unknown);
}

#[tokio::test]
async fn cancellation_converges_from_any_phase() {
    // From every phase of a run, cancellation reaches CancelledByUser
    // within a bounded number of ticks
    for ticks_before_cancel in 0..4 {
        let ctx = test_context();
        let job = ctx.insert_pending_job("analyse");
        ctx.tick_n(ticks_before_cancel).await;
        ctx.cancel_job(&job.id);

        ctx.tick_n(4).await;
        assert_eq!(
            ctx.status_of(&job.id),
            StatusCode::CancelledByUser,
            "not converged after cancelling at tick {}",
            ticks_before_cancel
        );
    }
}

#[tokio::test]
async fn db_maintenance_preempts_database_jobs() {
    let mut config = EngineConfig::for_backend(BACKEND);
    config.using_dummy_data_backend = false;
    let ctx = test_context_with(config);

    let mut job = Job::builder()
        .backend(BACKEND)
        .action("generate_cohort")
        .run_command("cohortextractor:latest generate_cohort --output-dir=output")
        .build();
    job.database_name = "full".to_string();
    ctx.db.insert_job(&job).unwrap();

    ctx.tick_n(2).await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Executing);
    ctx.executor.hold(&job.id);

    ctx.db.set_flag(FLAG_MODE, Some("db-maintenance"), BACKEND, 10).unwrap();
    ctx.tick().await;

    let preempted = ctx.job(&job.id);
    assert_eq!(preempted.status_code, StatusCode::WaitingDbMaintenance);
    assert_eq!(preempted.state, State::Pending);
    assert!(preempted.started_at.is_none());
    assert_eq!(ctx.executor.state_of(&job.id), ExecutorState::Unknown);
    assert!(ctx.db.active_run_job_task(&job.id).unwrap().is_none());

    // While the flag is up the job stays parked
    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::WaitingDbMaintenance);

    // Clearing the flag lets it run again from the start
    ctx.executor.release(&job.id);
    ctx.db.set_flag(FLAG_MODE, None, BACKEND, 20).unwrap();
    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Preparing);
    assert!(ctx.job(&job.id).started_at.is_some());
}

#[tokio::test]
async fn maintenance_ignores_jobs_without_database_access() {
    let mut config = EngineConfig::for_backend(BACKEND);
    config.using_dummy_data_backend = false;
    let ctx = test_context_with(config);
    let job = ctx.insert_pending_job("analyse");

    ctx.db.set_flag(FLAG_MODE, Some("db-maintenance"), BACKEND, 10).unwrap();
    ctx.tick_n(2).await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Executing);
}

#[tokio::test]
async fn unmatched_patterns_fail_the_job() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("generate");
    ctx.executor.set_results(
        &job.id,
        fm_core::JobResults {
            exit_code: 0,
            image_id: "sha256:fake".to_string(),
            unmatched_patterns: vec!["output/*.csv".to_string()],
            unmatched_outputs: vec!["output/x.log".to_string()],
            hint: Some("No outputs found matching patterns:\n - output/*.csv".to_string()),
            ..Default::default()
        },
    );

    ctx.tick_n(4).await;
    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::UnmatchedPatterns);
    assert_eq!(job.state, State::Failed);
    assert_eq!(job.unmatched_patterns, ["output/*.csv"]);
    assert_eq!(job.unmatched_outputs, ["output/x.log"]);
    assert!(job.status_message.unwrap().contains("No outputs found matching patterns"));
}

#[tokio::test]
async fn nonzero_exit_fails_the_job() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("generate");
    ctx.executor.set_results(
        &job.id,
        fm_core::JobResults {
            exit_code: 3,
            image_id: "sha256:fake".to_string(),
            ..Default::default()
        },
    );

    ctx.tick_n(4).await;
    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::NonzeroExit);
    assert!(job.status_message.unwrap().contains("error code"));
}

#[tokio::test]
async fn unexpected_executor_state_is_an_internal_error() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");
    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Preparing);

    // The executor suddenly claims the job already executed: neither the
    // expected state nor its successor
    ctx.executor.set_state(&job.id, ExecutorState::Executed);
    ctx.executor.hold(&job.id);
    ctx.tick().await;

    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::InternalError);
    assert!(job.status_message.unwrap().contains("Invalid transition"));
}

#[tokio::test]
async fn transient_executor_failures_are_retried() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");
    ctx.executor.fail_status_times(&job.id, 2);

    // Two failing ticks leave the job untouched
    ctx.tick_n(2).await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Created);

    // Third tick gets through
    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Preparing);
}

#[tokio::test]
async fn persistent_executor_failures_escalate() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");
    ctx.executor.fail_status_times(&job.id, 100);

    ctx.tick_n(4).await;
    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::InternalError);
    assert!(job.status_message.unwrap().contains("Executor kept failing"));
}

#[tokio::test]
async fn stuck_dependency_wait_escalates() {
    let ctx = test_context();
    let mut job = Job::builder().backend(BACKEND).action("analyse").build();
    // Waiting on a job that does not exist in the database
    job.wait_for_job_ids = vec!["missing000000000".to_string()];
    ctx.db.insert_job(&job).unwrap();

    ctx.tick().await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::WaitingOnDependencies);

    ctx.clock.advance(Duration::from_secs(3 * 60 * 60));
    ctx.tick().await;
    let job = ctx.job(&job.id);
    assert_eq!(job.status_code, StatusCode::InternalError);
    assert!(job.status_message.unwrap().contains("Waited too long on dependencies"));
}

#[tokio::test]
async fn run_task_lifecycle_follows_the_job() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");

    ctx.tick().await;
    let task = ctx.db.active_run_job_task(&job.id).unwrap().unwrap();
    assert!(task.active);
    assert_eq!(task.backend, BACKEND);

    ctx.tick_n(3).await;
    assert_eq!(ctx.status_of(&job.id), StatusCode::Succeeded);
    assert!(ctx.db.active_run_job_task(&job.id).unwrap().is_none());
}

#[tokio::test]
async fn timestamps_are_monotonic_across_the_run() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");

    let mut last_ns = 0;
    for _ in 0..5 {
        ctx.clock.advance(Duration::from_secs(1));
        ctx.tick().await;
        let current = ctx.job(&job.id);
        assert!(current.status_code_updated_at >= last_ns);
        last_ns = current.status_code_updated_at;
    }
}
