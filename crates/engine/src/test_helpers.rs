// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use fm_core::{FakeClock, Job, JobRequest, StatusCode};
use fm_executors::FakeExecutor;
use fm_pipeline::FakeGit;
use fm_storage::Database;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::run_loop::Engine;

pub(crate) const BACKEND: &str = "test-backend";
pub(crate) const REPO: &str = "https://github.com/test-org/study";
pub(crate) const COMMIT: &str = "0000000000000000000000000000000000000000";

pub(crate) struct TestContext {
    pub engine: Engine<FakeExecutor, FakeClock>,
    pub executor: FakeExecutor,
    pub clock: FakeClock,
    pub db: Database,
}

pub(crate) fn test_context() -> TestContext {
    test_context_with(EngineConfig::for_backend(BACKEND))
}

pub(crate) fn test_context_with(config: EngineConfig) -> TestContext {
    let db = Database::in_memory().unwrap();
    let executor = FakeExecutor::new();
    let clock = FakeClock::new();
    let engine = Engine::new(db.clone(), executor.clone(), config, clock.clone());
    TestContext { engine, executor, clock, db }
}

impl TestContext {
    pub(crate) async fn tick(&self) {
        self.engine.tick(&CancellationToken::new()).await.unwrap();
    }

    pub(crate) async fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick().await;
        }
    }

    pub(crate) fn insert_pending_job(&self, action: &str) -> Job {
        let job = Job::builder().backend(BACKEND).action(action).build();
        self.db.insert_job(&job).unwrap();
        job
    }

    pub(crate) fn job(&self, id: &str) -> Job {
        self.db.job_by_id(id).unwrap().unwrap()
    }

    pub(crate) fn status_of(&self, id: &str) -> StatusCode {
        self.job(id).status_code
    }

    pub(crate) fn cancel_job(&self, id: &str) {
        let mut job = self.job(id);
        job.cancelled = true;
        self.db.update_job(&job).unwrap();
    }
}

/// A git fake pre-loaded with a study repo containing `project_yaml`.
pub(crate) fn study_git(project_yaml: &str) -> FakeGit {
    let git = FakeGit::new();
    git.add_ref(REPO, "main", COMMIT);
    git.add_file(REPO, COMMIT, "project.yaml", project_yaml.as_bytes());
    git
}

pub(crate) fn request(id: &str, actions: &[&str]) -> JobRequest {
    JobRequest::builder()
        .id(id)
        .repo_url(REPO)
        .backend(BACKEND)
        .requested_actions(actions.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .build()
}
