// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration, built once at startup and threaded through loop
//! construction. Nothing here is global or mutable.

use fm_pipeline::ActionsConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The backend this controller is responsible for
    pub backend: String,
    /// Total worker budget; each running job consumes its action's weight
    pub max_workers: f64,
    pub job_loop_interval: Duration,
    pub poll_interval: Duration,
    /// How long a job may sit waiting on dependencies that can no longer
    /// make progress before it is failed
    pub stuck_job_timeout: Duration,
    /// Image names which are runtimes; anything else is a reusable action
    pub allowed_images: BTreeSet<String>,
    /// GitHub orgs study code may come from; empty disables the check
    pub allowed_github_orgs: Vec<String>,
    pub actions: ActionsConfig,
    /// database name → connection URL (None when not configured here)
    pub database_urls: BTreeMap<String, Option<String>>,
    pub using_dummy_data_backend: bool,
    /// Relaxes workspace-name validation for ad-hoc local runs
    pub local_run_mode: bool,
    /// action name → worker-budget cost; unlisted actions cost 1.0
    pub job_cpu_weights: BTreeMap<String, f64>,
}

impl EngineConfig {
    /// Worker-budget cost of one job of `action`.
    pub fn weight(&self, action: &str) -> f64 {
        self.job_cpu_weights.get(action).copied().unwrap_or(1.0)
    }

    /// A permissive configuration for tests and local runs.
    pub fn for_backend(backend: &str) -> Self {
        let allowed_images: BTreeSet<String> =
            ["cohortextractor", "databuilder", "ehrql", "python", "r", "stata-mp", "jupyter"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        Self {
            backend: backend.to_string(),
            max_workers: 10.0,
            job_loop_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
            stuck_job_timeout: Duration::from_secs(2 * 60 * 60),
            allowed_images: allowed_images.clone(),
            allowed_github_orgs: Vec::new(),
            actions: ActionsConfig {
                github_org: "test-actions".to_string(),
                github_org_url: "https://github.com/test-actions".to_string(),
                allowed_images,
            },
            database_urls: [
                ("full".to_string(), Some("mssql://localhost/full".to_string())),
                ("slice".to_string(), Some("mssql://localhost/slice".to_string())),
                ("dummy".to_string(), None),
            ]
            .into(),
            using_dummy_data_backend: true,
            local_run_mode: false,
            job_cpu_weights: BTreeMap::new(),
        }
    }
}
