// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dev utility: synthesise a JobRequest locally and run it through the
//! expander, without involving the coordination server.

use anyhow::{Context, Result};
use fm_core::{random_id, JobRequest, SystemClock};
use fm_engine::create_or_update_jobs;

use super::open_database;

pub struct Args {
    pub repo_url: String,
    pub actions: Vec<String>,
    pub branch: String,
    pub commit: Option<String>,
    pub workspace: String,
    pub database: String,
    pub force_run_dependencies: bool,
    pub force_run_failed: bool,
}

pub async fn run(args: Args) -> Result<()> {
    if args.actions.is_empty() {
        anyhow::bail!("at least one action must be supplied");
    }
    let (config, db) = open_database()?;
    let git = fm_daemon::lifecycle::new_git(&config);

    let id = random_id();
    let request = JobRequest {
        id: id.clone(),
        repo_url: args.repo_url.clone(),
        commit: args.commit,
        branch: args.branch,
        requested_actions: args.actions,
        cancelled_actions: Vec::new(),
        workspace: args.workspace,
        database_name: args.database,
        backend: config.backend.clone(),
        force_run_dependencies: args.force_run_dependencies,
        force_run_failed: args.force_run_failed,
        original: serde_json::json!({
            "id": id,
            "repo": args.repo_url,
            "source": "foreman add-job",
        }),
    };

    create_or_update_jobs(&db, &git, &config.engine_config(), &SystemClock, &request)
        .await
        .context("could not create jobs")?;

    for job in db.jobs_for_request(&request.id)? {
        println!("{}  {}  {}  {}", job.id, job.status_code, job.action, job.run_command);
    }
    Ok(())
}
