// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Result;
use fm_core::{State, StatusCode, Task};

use super::{confirm, find_job, now, open_database};

pub fn run(partial_ids: &[String], assume_yes: bool) -> Result<()> {
    if partial_ids.is_empty() {
        anyhow::bail!("at least one job ID must be supplied");
    }
    let (_, db) = open_database()?;

    let mut jobs = Vec::new();
    for partial in partial_ids {
        let job = find_job(&db, partial)?;
        if !job.is_active() {
            anyhow::bail!("job {} has already finished ({})", job.id, job.status_code);
        }
        jobs.push(job);
    }

    for job in &jobs {
        println!("about to kill {}  {}  {}", job.id, job.workspace, job.action);
    }
    if !confirm("Are you sure?", assume_yes)? {
        anyhow::bail!("aborted");
    }

    let timestamp = now();
    for mut job in jobs {
        db.deactivate_task(&Task::run_job_id(&job.id), timestamp)?;
        job.cancelled = true;
        job.state = State::Failed;
        job.status_code = StatusCode::KilledByAdmin;
        job.status_message = Some("Killed by admin".to_string());
        job.updated_at = timestamp;
        if job.completed_at.is_none() {
            job.completed_at = Some(timestamp);
        }
        db.update_job(&job)?;
        println!("killed {}", job.id);
    }
    Ok(())
}
