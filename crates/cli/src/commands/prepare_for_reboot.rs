// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reset every running job to PENDING so the fleet restarts cleanly after
//! a host reboot. Requires the backend to be paused first.

use anyhow::Result;
use fm_core::{State, StatusCode, Task, TaskType, FLAG_PAUSED};

use super::{confirm, now, open_database};

pub fn run(backend: &str, assume_yes: bool) -> Result<()> {
    let (_, db) = open_database()?;

    let paused = db.flag_value(FLAG_PAUSED, backend, None)?;
    if paused.as_deref() != Some("true") {
        anyhow::bail!("backend must be paused first: foreman pause on {}", backend);
    }

    let running: Vec<_> = db
        .active_jobs_for_backend(backend)?
        .into_iter()
        .filter(|job| job.state == State::Running)
        .collect();
    if running.is_empty() {
        println!("No running jobs.");
        return Ok(());
    }

    println!(
        "This will interrupt {} running job(s) and reset them to be re-run after reboot.",
        running.len()
    );
    if !confirm("Are you sure you want to continue?", assume_yes)? {
        anyhow::bail!("aborted");
    }

    let timestamp = now();
    for mut job in running {
        db.deactivate_task(&Task::run_job_id(&job.id), timestamp)?;
        db.insert_task(&Task {
            id: Task::cancel_job_id(&job.id),
            task_type: TaskType::CancelJob,
            active: true,
            backend: backend.to_string(),
            created_at: timestamp,
            finished_at: None,
            definition: serde_json::json!({ "job_id": job.id }),
            results: None,
        })?;

        job.state = State::Pending;
        job.status_code = StatusCode::WaitingOnReboot;
        job.status_message = Some("Waiting for backend to be rebooted".to_string());
        job.started_at = None;
        job.updated_at = timestamp;
        db.update_job(&job)?;
        println!("reset {} ({})", job.id, job.action);
    }
    Ok(())
}
