// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, supervision, and shutdown.

use fm_core::{JobDefinition, JobResults, JobStatus, Privacy, SystemClock};
use fm_engine::{run_sync_loop, Engine};
use fm_executors::k8s::KubernetesExecutorConfig;
use fm_executors::local::LocalExecutorConfig;
use fm_executors::{ExecutorApi, ExecutorError, KubernetesExecutor, LocalDockerExecutor};
use fm_pipeline::{CliGit, GitClient};
use fm_storage::Database;
use fs2::FileExt;
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::env::{Config, ConfigError, ExecutorKind};
use crate::http::JobServerClient;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("another controller already holds the lock for {0}")]
    AlreadyRunning(String),
    #[error("could not open database: {0}")]
    Storage(#[from] fm_storage::StorageError),
    #[error("could not initialise executor: {0}")]
    Executor(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executor selected at startup; delegates every call.
pub enum AnyExecutor {
    Local(LocalDockerExecutor),
    Kubernetes(KubernetesExecutor),
}

#[async_trait::async_trait]
impl ExecutorApi for AnyExecutor {
    async fn prepare(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.prepare(job).await,
            AnyExecutor::Kubernetes(e) => e.prepare(job).await,
        }
    }

    async fn execute(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.execute(job).await,
            AnyExecutor::Kubernetes(e) => e.execute(job).await,
        }
    }

    async fn finalize(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.finalize(job).await,
            AnyExecutor::Kubernetes(e) => e.finalize(job).await,
        }
    }

    async fn terminate(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.terminate(job).await,
            AnyExecutor::Kubernetes(e) => e.terminate(job).await,
        }
    }

    async fn cleanup(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.cleanup(job).await,
            AnyExecutor::Kubernetes(e) => e.cleanup(job).await,
        }
    }

    async fn get_status(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.get_status(job).await,
            AnyExecutor::Kubernetes(e) => e.get_status(job).await,
        }
    }

    async fn get_results(&self, job: &JobDefinition) -> Result<Option<JobResults>, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.get_results(job).await,
            AnyExecutor::Kubernetes(e) => e.get_results(job).await,
        }
    }

    async fn delete_files(
        &self,
        workspace: &str,
        privacy: Privacy,
        paths: &[String],
    ) -> Result<Vec<String>, ExecutorError> {
        match self {
            AnyExecutor::Local(e) => e.delete_files(workspace, privacy, paths).await,
            AnyExecutor::Kubernetes(e) => e.delete_files(workspace, privacy, paths).await,
        }
    }
}

/// Entry point for the `foremand` binary.
pub async fn run() -> Result<(), LifecycleError> {
    let config = Config::from_env()?;
    let _log_guard = init_logging(&config)?;
    tracing::info!(backend = %config.backend, "foremand starting");

    // One active controller per backend: hold an exclusive lock beside the
    // database for the life of the process
    let _lock = acquire_lock(&config)?;

    let db = Database::open(&config.database_file)?;
    let git: Arc<dyn GitClient> = Arc::new(new_git(&config));
    let executor = build_executor(&config, Arc::clone(&git)).await?;
    let engine_config = config.engine_config();

    let engine = Arc::new(Engine::new(db.clone(), executor, engine_config.clone(), SystemClock));
    let api = Arc::new(JobServerClient::new(&config.job_server_endpoint, &config.job_server_token));

    let shutdown = CancellationToken::new();
    let run_handle = {
        let engine = Arc::clone(&engine);
        let token = shutdown.clone();
        tokio::spawn(async move { engine.run(token).await })
    };
    let sync_handle = {
        let token = shutdown.clone();
        let config = engine_config.clone();
        let db = db.clone();
        let git = Arc::clone(&git);
        tokio::spawn(async move {
            run_sync_loop(db, git, api, config, SystemClock, token).await
        })
    };

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping loops");
    shutdown.cancel();
    let _ = run_handle.await;
    let _ = sync_handle.await;
    tracing::info!("foremand stopped");
    Ok(())
}

pub fn new_git(config: &Config) -> CliGit {
    CliGit::new(
        config.git_repo_dir(),
        config.private_repo_access_token.clone(),
        config.github_proxy_domain.clone(),
        &config.backend,
    )
}

async fn build_executor(
    config: &Config,
    git: Arc<dyn GitClient>,
) -> Result<AnyExecutor, LifecycleError> {
    match config.executor {
        ExecutorKind::Local => {
            let mut local_config: LocalExecutorConfig = config.local_executor_config();
            if local_config.stata_license.is_none() {
                if let Some(repo) = &config.stata_license_repo {
                    local_config.stata_license = fetch_stata_license(git.as_ref(), repo).await;
                }
            }
            std::fs::create_dir_all(&local_config.high_privacy_storage_base)?;
            std::fs::create_dir_all(&local_config.medium_privacy_storage_base)?;
            Ok(AnyExecutor::Local(LocalDockerExecutor::new(local_config, git)))
        }
        ExecutorKind::Kubernetes => {
            let k8s_config = KubernetesExecutorConfig {
                namespace: config.k8s_namespace.clone(),
                tool_image: config.k8s_tool_image.clone(),
                volume_size: config.k8s_volume_size.clone(),
                egress_whitelist: config.k8s_egress_whitelist.clone(),
                docker_registry: config.docker_registry.clone(),
            };
            let executor = KubernetesExecutor::new(k8s_config)
                .await
                .map_err(|e| LifecycleError::Executor(e.to_string()))?;
            Ok(AnyExecutor::Kubernetes(executor))
        }
    }
}

/// Best-effort: stata needs a license at runtime and some deployments keep
/// it in a private repo rather than the environment.
async fn fetch_stata_license(git: &dyn GitClient, repo: &str) -> Option<String> {
    let sha = match git.resolve_ref(repo, "main").await {
        Ok(sha) => sha,
        Err(e) => {
            tracing::warn!(repo, error = %e, "could not resolve stata license repo");
            return None;
        }
    };
    match git.read_file(repo, &sha, "stata.lic").await {
        Ok(bytes) => String::from_utf8(bytes).ok().map(|s| s.trim().to_string()),
        Err(e) => {
            tracing::warn!(repo, error = %e, "could not read stata license");
            None
        }
    }
}

fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    let lock_path = config.database_file.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning(config.backend.clone()))?;
    Ok(file)
}

fn init_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    std::fs::create_dir_all(config.log_dir())?;
    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "foremand.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!(error = %e, "could not install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
