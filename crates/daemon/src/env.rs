// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.
//!
//! Configuration comes exclusively from the environment (there is no config
//! file); everything is read once at startup into [`Config`] and threaded
//! through construction from there.

use fm_engine::EngineConfig;
use fm_executors::local::LocalExecutorConfig;
use fm_pipeline::ActionsConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Local,
    Kubernetes,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: String,
    pub database_file: PathBuf,
    pub work_dir: PathBuf,
    pub high_privacy_storage_base: PathBuf,
    pub medium_privacy_storage_base: PathBuf,
    pub max_workers: f64,
    pub job_loop_interval: Duration,
    pub poll_interval: Duration,
    pub stuck_job_timeout: Duration,
    pub job_server_endpoint: String,
    pub job_server_token: String,
    pub private_repo_access_token: Option<String>,
    pub github_proxy_domain: Option<String>,
    pub actions_github_org: String,
    pub allowed_images: BTreeSet<String>,
    pub allowed_github_orgs: Vec<String>,
    pub docker_registry: String,
    /// database name → connection URL, None where undefined on this backend
    pub database_urls: BTreeMap<String, Option<String>>,
    pub stata_license: Option<String>,
    pub stata_license_repo: Option<String>,
    pub executor: ExecutorKind,
    pub job_cpu_weights: BTreeMap<String, f64>,
    // Kubernetes variant knobs
    pub k8s_namespace: String,
    pub k8s_tool_image: String,
    pub k8s_volume_size: String,
    pub k8s_egress_whitelist: Vec<String>,
}

const DEFAULT_ALLOWED_IMAGES: &[&str] =
    &["cohortextractor", "databuilder", "ehrql", "jupyter", "python", "r", "stata-mp"];

impl Config {
    /// Read every recognised key from the environment. Invalid values are
    /// startup errors, not fallbacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = required("BACKEND")?;
        let work_dir = PathBuf::from(var_or("WORK_DIR", "workdir"));
        Ok(Self {
            database_file: PathBuf::from(
                std::env::var("DATABASE_FILE")
                    .unwrap_or_else(|_| work_dir.join("db.sqlite").to_string_lossy().into_owned()),
            ),
            high_privacy_storage_base: PathBuf::from(
                std::env::var("HIGH_PRIVACY_STORAGE_BASE").unwrap_or_else(|_| {
                    work_dir.join("high_privacy").to_string_lossy().into_owned()
                }),
            ),
            medium_privacy_storage_base: PathBuf::from(
                std::env::var("MEDIUM_PRIVACY_STORAGE_BASE").unwrap_or_else(|_| {
                    work_dir.join("medium_privacy").to_string_lossy().into_owned()
                }),
            ),
            max_workers: match std::env::var("MAX_WORKERS") {
                Ok(value) => parse("MAX_WORKERS", &value)?,
                Err(_) => default_max_workers(),
            },
            job_loop_interval: duration_var("JOB_LOOP_INTERVAL", 1.0)?,
            poll_interval: duration_var("POLL_INTERVAL", 5.0)?,
            stuck_job_timeout: duration_var("STUCK_JOB_TIMEOUT", 2.0 * 60.0 * 60.0)?,
            job_server_endpoint: var_or("JOB_SERVER_ENDPOINT", "https://jobs.opensafely.org/api/v2"),
            job_server_token: var_or("JOB_SERVER_TOKEN", "token"),
            private_repo_access_token: optional("PRIVATE_REPO_ACCESS_TOKEN"),
            github_proxy_domain: optional("GITHUB_PROXY_DOMAIN"),
            actions_github_org: var_or("ACTIONS_GITHUB_ORG", "opensafely-actions"),
            allowed_images: match optional("ALLOWED_IMAGES") {
                Some(value) => value.split(',').map(|s| s.trim().to_string()).collect(),
                None => DEFAULT_ALLOWED_IMAGES.iter().map(|s| s.to_string()).collect(),
            },
            allowed_github_orgs: optional("ALLOWED_GITHUB_ORGS")
                .map(|value| value.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            docker_registry: var_or("DOCKER_REGISTRY", "ghcr.io/opensafely-core"),
            database_urls: [
                ("full".to_string(), optional("FULL_DATABASE_URL")),
                ("slice".to_string(), optional("SLICE_DATABASE_URL")),
                ("dummy".to_string(), optional("DUMMY_DATABASE_URL")),
            ]
            .into(),
            stata_license: optional("STATA_LICENSE"),
            stata_license_repo: optional("STATA_LICENSE_REPO"),
            executor: match var_or("EXECUTOR", "local").as_str() {
                "local" => ExecutorKind::Local,
                "kubernetes" => ExecutorKind::Kubernetes,
                other => {
                    return Err(ConfigError::Invalid {
                        name: "EXECUTOR",
                        value: other.to_string(),
                    })
                }
            },
            job_cpu_weights: parse_weights(&var_or("JOB_CPU_WEIGHTS", ""))?,
            k8s_namespace: var_or("K8S_NAMESPACE", "foreman"),
            k8s_tool_image: var_or("K8S_TOOL_IMAGE", "ghcr.io/opensafely-core/foreman-tool:latest"),
            k8s_volume_size: var_or("K8S_VOLUME_SIZE", "20Gi"),
            k8s_egress_whitelist: optional("K8S_EGRESS_WHITELIST")
                .map(|value| value.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            work_dir,
            backend,
        })
    }

    /// The dummy-data backend runs without any real patient database.
    pub fn using_dummy_data_backend(&self) -> bool {
        self.backend == "expectations"
    }

    pub fn git_repo_dir(&self) -> PathBuf {
        self.work_dir.join("repos")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.high_privacy_storage_base.join("logs")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            backend: self.backend.clone(),
            max_workers: self.max_workers,
            job_loop_interval: self.job_loop_interval,
            poll_interval: self.poll_interval,
            stuck_job_timeout: self.stuck_job_timeout,
            allowed_images: self.allowed_images.clone(),
            allowed_github_orgs: self.allowed_github_orgs.clone(),
            actions: ActionsConfig {
                github_org: self.actions_github_org.clone(),
                github_org_url: format!("https://github.com/{}", self.actions_github_org),
                allowed_images: self.allowed_images.clone(),
            },
            database_urls: self.database_urls.clone(),
            using_dummy_data_backend: self.using_dummy_data_backend(),
            local_run_mode: false,
            job_cpu_weights: self.job_cpu_weights.clone(),
        }
    }

    pub fn local_executor_config(&self) -> LocalExecutorConfig {
        LocalExecutorConfig {
            high_privacy_storage_base: self.high_privacy_storage_base.clone(),
            medium_privacy_storage_base: self.medium_privacy_storage_base.clone(),
            docker_registry: self.docker_registry.clone(),
            database_urls: self
                .database_urls
                .iter()
                .filter_map(|(name, url)| url.clone().map(|url| (name.clone(), url)))
                .collect(),
            using_dummy_data_backend: self.using_dummy_data_backend(),
            stata_license: self.stata_license.clone(),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).ok().filter(|v| !v.is_empty()).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid { name, value: value.to_string() })
}

fn duration_var(name: &'static str, default_secs: f64) -> Result<Duration, ConfigError> {
    let secs: f64 = match std::env::var(name) {
        Ok(value) => parse(name, &value)?,
        Err(_) => default_secs,
    };
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::Invalid { name, value: secs.to_string() });
    }
    Ok(Duration::from_secs_f64(secs))
}

/// `action=weight` pairs, comma separated.
fn parse_weights(value: &str) -> Result<BTreeMap<String, f64>, ConfigError> {
    let mut weights = BTreeMap::new();
    for pair in value.split(',').filter(|p| !p.trim().is_empty()) {
        let (action, weight) = pair.split_once('=').ok_or(ConfigError::Invalid {
            name: "JOB_CPU_WEIGHTS",
            value: pair.to_string(),
        })?;
        let weight: f64 = weight.trim().parse().map_err(|_| ConfigError::Invalid {
            name: "JOB_CPU_WEIGHTS",
            value: pair.to_string(),
        })?;
        weights.insert(action.trim().to_string(), weight);
    }
    Ok(weights)
}

fn default_max_workers() -> f64 {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    (cores.saturating_sub(1)).max(1) as f64
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod env_tests;
