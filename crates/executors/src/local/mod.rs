// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local executor: jobs run as containers on the host Docker daemon with
//! bind-mounted volume directories under the high-privacy base.
//!
//! Every phase is keyed off the job ID and derives its state from Docker
//! and the filesystem, so a controller restart resumes cleanly.

pub mod docker;
pub mod volumes;

use async_trait::async_trait;
use fm_core::{ExecutorState, JobDefinition, JobResults, JobStatus, Privacy};
use fm_pipeline::GitClient;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{ExecutorApi, ExecutorError};

/// Exit code recorded for containers we killed.
const EXIT_CODE_KILLED: i64 = 137;

#[derive(Debug, Clone)]
pub struct LocalExecutorConfig {
    pub high_privacy_storage_base: PathBuf,
    pub medium_privacy_storage_base: PathBuf,
    /// Registry prefixed onto unqualified image references
    pub docker_registry: String,
    /// database name → connection URL; only defined databases appear
    pub database_urls: BTreeMap<String, String>,
    /// On the dummy-data backend no job ever receives database credentials
    pub using_dummy_data_backend: bool,
    pub stata_license: Option<String>,
}

enum PrepareOutcome {
    InFlight,
    Failed(String),
}

pub struct LocalDockerExecutor {
    config: LocalExecutorConfig,
    git: Arc<dyn GitClient>,
    prepares: Arc<Mutex<HashMap<String, PrepareOutcome>>>,
}

impl LocalDockerExecutor {
    pub fn new(config: LocalExecutorConfig, git: Arc<dyn GitClient>) -> Self {
        Self { config, git, prepares: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn volume_dir(&self, job_id: &str) -> PathBuf {
        self.config.high_privacy_storage_base.join("volumes").join(job_id)
    }

    fn high_workspace_dir(&self, workspace: &str) -> PathBuf {
        self.config.high_privacy_storage_base.join("workspaces").join(workspace)
    }

    fn medium_workspace_dir(&self, workspace: &str) -> PathBuf {
        self.config.medium_privacy_storage_base.join("workspaces").join(workspace)
    }

    fn qualified_image(&self, image: &str) -> String {
        if image.contains('/') {
            image.to_string()
        } else {
            format!("{}/{}", self.config.docker_registry.trim_end_matches('/'), image)
        }
    }

    fn job_env(&self, job: &JobDefinition) -> BTreeMap<String, String> {
        let mut env = job.env.clone();
        if job.requires_db && !self.config.using_dummy_data_backend {
            if let Some(url) = job
                .database_name
                .as_ref()
                .and_then(|name| self.config.database_urls.get(name))
            {
                env.insert("DATABASE_URL".to_string(), url.clone());
            }
        }
        if job.image.starts_with("stata") {
            if let Some(license) = &self.config.stata_license {
                env.insert("STATA_LICENSE".to_string(), license.clone());
            }
        }
        env
    }

    /// Background body of `prepare`: checkout, inputs, manifest, marker.
    async fn do_prepare(
        config: LocalExecutorConfig,
        git: Arc<dyn GitClient>,
        job: JobDefinition,
        volume: PathBuf,
    ) -> Result<(), ExecutorError> {
        git.checkout(&job.study.repo_url, &job.study.commit, &volume)
            .await
            .map_err(|e| ExecutorError::Failed(format!("could not fetch study code: {}", e)))?;

        let high_workspace =
            config.high_privacy_storage_base.join("workspaces").join(&job.workspace);
        for input in &job.inputs {
            volumes::copy_file(&high_workspace, &volume, input).map_err(|_| {
                ExecutorError::Failed(format!("missing input file from previous job: {}", input))
            })?;
        }

        let initial = volumes::list_files(&volume)?;
        volumes::write_initial_manifest(&volume, initial)?;
        std::fs::write(volumes::prepared_marker(&volume), b"")?;
        Ok(())
    }

    fn spawn_prepare(&self, job: &JobDefinition) {
        let config = self.config.clone();
        let git = Arc::clone(&self.git);
        let prepares = Arc::clone(&self.prepares);
        let job = job.clone();
        let volume = self.volume_dir(&job.id);
        prepares.lock().insert(job.id.clone(), PrepareOutcome::InFlight);
        tokio::spawn(async move {
            let job_id = job.id.clone();
            match Self::do_prepare(config, git, job, volume).await {
                Ok(()) => {
                    prepares.lock().remove(&job_id);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "preparation failed");
                    prepares.lock().insert(job_id, PrepareOutcome::Failed(e.to_string()));
                }
            }
        });
    }
}

#[async_trait]
impl ExecutorApi for LocalDockerExecutor {
    async fn prepare(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        let current = self.get_status(job).await?;
        match current.state {
            ExecutorState::Unknown => {}
            // Idempotent while preparation is underway or complete
            ExecutorState::Preparing | ExecutorState::Prepared => return Ok(current),
            other => {
                return Err(ExecutorError::Failed(format!(
                    "cannot prepare job in state {}",
                    other
                )))
            }
        }
        std::fs::create_dir_all(self.volume_dir(&job.id))?;
        self.spawn_prepare(job);
        Ok(JobStatus::new(ExecutorState::Preparing))
    }

    async fn execute(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        let current = self.get_status(job).await?;
        if current.state != ExecutorState::Prepared {
            return Err(ExecutorError::Failed(format!(
                "cannot execute job in state {}",
                current.state
            )));
        }

        let volume = self.volume_dir(&job.id);
        let name = docker::container_name(&job.id);
        let mut run_args = vec![
            format!("--name={}", name),
            format!("--label={}=job", docker::CONTAINER_LABEL),
            format!("--label=workspace={}", job.workspace),
            format!("--label=action={}", job.action),
            format!("--volume={}:/workspace", volume.display()),
            "--workdir=/workspace".to_string(),
        ];
        if !job.allow_network_access {
            run_args.push("--network=none".to_string());
        }
        for (key, value) in self.job_env(job) {
            run_args.push(format!("--env={}={}", key, value));
        }
        run_args.push(self.qualified_image(&job.image));
        run_args.extend(job.args.iter().cloned());

        docker::run_detached(&run_args).await?;
        Ok(JobStatus::new(ExecutorState::Executing))
    }

    async fn finalize(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        let volume = self.volume_dir(&job.id);
        if volumes::read_results(&volume)?.is_some() {
            return Ok(JobStatus::new(ExecutorState::Finalized));
        }
        let name = docker::container_name(&job.id);
        let Some(info) = docker::inspect(&name).await? else {
            return Err(ExecutorError::Failed("container disappeared before finalize".into()));
        };
        if info.running {
            return Err(ExecutorError::Failed("cannot finalize a running container".into()));
        }

        // Persist the log where the study developer can see it
        let log = docker::logs(&name).await.unwrap_or_default();
        let metadata_dir = self.high_workspace_dir(&job.workspace).join("metadata");
        std::fs::create_dir_all(&metadata_dir)?;
        std::fs::write(metadata_dir.join(format!("{}.log", job.action)), &log)?;

        let initial = volumes::read_initial_manifest(&volume)?;
        let all_files = volumes::list_files(&volume)?;
        let produced: Vec<String> =
            all_files.into_iter().filter(|f| !initial.contains(f)).collect();

        let matches = volumes::match_outputs(job, &produced);
        if info.exit_code == 0 {
            volumes::publish_outputs(
                &volume,
                &self.high_workspace_dir(&job.workspace),
                &self.medium_workspace_dir(&job.workspace),
                &matches.outputs,
            )?;
        }

        let hint = if matches.unmatched_patterns.is_empty() {
            None
        } else {
            Some(format!(
                "No outputs found matching patterns:\n - {}",
                matches.unmatched_patterns.join("\n - ")
            ))
        };
        let results = JobResults {
            outputs: matches.outputs,
            unmatched_patterns: matches.unmatched_patterns,
            unmatched_outputs: matches.unmatched_outputs,
            exit_code: info.exit_code,
            image_id: info.image_id,
            message: None,
            hint,
        };
        volumes::write_results(&volume, &results)?;
        Ok(JobStatus::new(ExecutorState::Finalized))
    }

    async fn terminate(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        let volume = self.volume_dir(&job.id);
        let status = self.get_status(job).await?;
        match status.state {
            ExecutorState::Executing => {
                docker::kill(&docker::container_name(&job.id)).await?;
                Ok(JobStatus::new(ExecutorState::Executed))
            }
            ExecutorState::Prepared => {
                // Nothing ran, so there is no output to collect
                let results = JobResults {
                    exit_code: EXIT_CODE_KILLED,
                    message: Some("Cancelled by user".to_string()),
                    ..JobResults::default()
                };
                volumes::write_results(&volume, &results)?;
                Ok(JobStatus::new(ExecutorState::Finalized))
            }
            ExecutorState::Unknown | ExecutorState::Preparing => {
                self.prepares.lock().remove(&job.id);
                if volume.exists() {
                    std::fs::remove_dir_all(&volume)?;
                }
                Ok(JobStatus::new(ExecutorState::Unknown))
            }
            other => Ok(JobStatus::new(other)),
        }
    }

    async fn cleanup(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        docker::remove(&docker::container_name(&job.id)).await?;
        let volume = self.volume_dir(&job.id);
        if volume.exists() {
            std::fs::remove_dir_all(&volume)?;
        }
        self.prepares.lock().remove(&job.id);
        Ok(JobStatus::new(ExecutorState::Unknown))
    }

    async fn get_status(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        // In-flight or failed preparation is tracked in memory; everything
        // else is derived from disk and Docker
        match self.prepares.lock().get(&job.id) {
            Some(PrepareOutcome::InFlight) => {
                return Ok(JobStatus::new(ExecutorState::Preparing))
            }
            Some(PrepareOutcome::Failed(message)) => {
                return Ok(JobStatus::with_message(ExecutorState::Error, message.clone()))
            }
            None => {}
        }

        let volume = self.volume_dir(&job.id);
        if volumes::read_results(&volume)?.is_some() {
            return Ok(JobStatus::new(ExecutorState::Finalized));
        }
        if let Some(info) = docker::inspect(&docker::container_name(&job.id)).await? {
            let state =
                if info.running { ExecutorState::Executing } else { ExecutorState::Executed };
            return Ok(JobStatus::new(state));
        }
        if volumes::prepared_marker(&volume).exists() {
            return Ok(JobStatus::new(ExecutorState::Prepared));
        }
        if volume.exists() {
            // Preparation was interrupted (e.g. controller restart); kick it
            // off again, it is idempotent
            self.spawn_prepare(job);
            return Ok(JobStatus::new(ExecutorState::Preparing));
        }
        Ok(JobStatus::new(ExecutorState::Unknown))
    }

    async fn get_results(&self, job: &JobDefinition) -> Result<Option<JobResults>, ExecutorError> {
        volumes::read_results(&self.volume_dir(&job.id))
    }

    async fn delete_files(
        &self,
        workspace: &str,
        privacy: Privacy,
        paths: &[String],
    ) -> Result<Vec<String>, ExecutorError> {
        let base = match privacy {
            Privacy::HighlySensitive => self.high_workspace_dir(workspace),
            Privacy::ModeratelySensitive => self.medium_workspace_dir(workspace),
        };
        let mut deleted = Vec::new();
        for path in paths {
            // Reject anything that could reach outside the workspace
            if path.starts_with('/') || path.split('/').any(|part| part == "..") {
                continue;
            }
            let target = base.join(path);
            if target.is_file() && std::fs::remove_file(&target).is_ok() {
                deleted.push(path.clone());
            }
        }
        Ok(deleted)
    }
}
