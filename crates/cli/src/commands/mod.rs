// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod add_job;
pub mod db_maintenance;
pub mod flags;
pub mod kill_job;
pub mod pause;
pub mod prepare_for_reboot;
pub mod retry_job;

use anyhow::{Context, Result};
use fm_core::{Clock, SystemClock};
use fm_daemon::Config;
use fm_storage::Database;

/// Open the controller database for the configured backend.
pub fn open_database() -> Result<(Config, Database)> {
    let config = Config::from_env().context("could not load configuration")?;
    let db = Database::open(&config.database_file).context("could not open database")?;
    Ok((config, db))
}

pub fn now() -> i64 {
    SystemClock.epoch_secs()
}

/// Find exactly one job by ID prefix, or explain why not.
pub fn find_job(db: &Database, partial_id: &str) -> Result<fm_core::Job> {
    let mut matches = db.jobs_by_partial_id(partial_id)?;
    match matches.len() {
        0 => anyhow::bail!("no job matches '{}'", partial_id),
        1 => Ok(matches.remove(0)),
        n => {
            for job in &matches {
                eprintln!("  {}  {}  {}", job.id, job.action, job.status_code);
            }
            anyhow::bail!("'{}' matches {} jobs", partial_id, n)
        }
    }
}

/// Ask for confirmation on stdin unless `--yes` was given.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    eprint!("{} (y/N) ", prompt);
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
