// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timed status spans for fleet visualisation.
//!
//! Every status change closes a span named after the *leaving* status,
//! running from the previous `status_code_updated_at` to now; a terminal
//! transition additionally emits a root `JOB` span covering the job's whole
//! life. Emitted as structured events with explicit timestamps so a
//! collector can reconstruct flame graphs of fleet state over time.

use fm_core::{Job, StatusCode};

pub const STATUS_TARGET: &str = "foreman::spans::status";
pub const JOB_TARGET: &str = "foreman::spans::job";
pub const TICK_TARGET: &str = "foreman::spans::tick";

/// Close the span for the status the job is leaving.
pub fn record_status_span(job: &Job, leaving: StatusCode, entering: StatusCode, end_ns: i64) {
    tracing::info!(
        target: STATUS_TARGET,
        job_id = %job.id,
        job_request_id = %job.job_request_id,
        workspace = %job.workspace,
        action = %job.action,
        status = %leaving,
        next_status = %entering,
        start_ns = job.status_code_updated_at,
        end_ns,
        "status span"
    );
}

/// Root span for a job reaching a terminal state.
pub fn record_job_span(job: &Job, end_ns: i64) {
    tracing::info!(
        target: JOB_TARGET,
        job_id = %job.id,
        job_request_id = %job.job_request_id,
        workspace = %job.workspace,
        action = %job.action,
        final_status = %job.status_code,
        succeeded = job.state == fm_core::State::Succeeded,
        start_ns = job.created_at * 1_000_000_000,
        end_ns,
        "job span"
    );
}

/// One run-loop tick, enveloping the per-status child spans of every job
/// observed in it.
pub fn record_tick_span(backend: &str, active_jobs: usize, start_ns: i64, end_ns: i64) {
    tracing::info!(
        target: TICK_TARGET,
        backend,
        active_jobs,
        start_ns,
        end_ns,
        "tick span"
    );
}
