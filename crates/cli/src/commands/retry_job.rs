// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flip a job that died with an internal error back into the running
//! pipeline. Only makes sense when the underlying container still exists,
//! which is exactly the case internal errors leave behind.

use anyhow::Result;
use fm_core::{State, StatusCode};

use super::{find_job, now, open_database};

pub fn run(partial_id: &str) -> Result<()> {
    let (_, db) = open_database()?;
    let mut job = find_job(&db, partial_id)?;

    if job.status_code != StatusCode::InternalError {
        anyhow::bail!(
            "only jobs which failed with an internal error can be retried; {} is {}",
            job.id,
            job.status_code
        );
    }

    job.state = State::Running;
    job.status_code = StatusCode::Executing;
    job.status_message = Some("Retried by admin".to_string());
    job.completed_at = None;
    job.updated_at = now();
    db.update_job(&job)?;
    println!("retrying {} ({})", job.id, job.action);
    Ok(())
}
