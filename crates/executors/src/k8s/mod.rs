// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes executor variant.
//!
//! Each controller job is realised as three Kubernetes Jobs — prepare,
//! execute, finalize — sharing a deterministically-named
//! PersistentVolumeClaim. Prepare and finalize run the configured tool
//! image with the serialised job definition in the environment; execute
//! runs the action image itself in a container named `job`, from which the
//! exit code and image digest are recovered. Finalize writes its
//! [`JobResults`] JSON to the container termination message.
//!
//! A NetworkPolicy admits only the configured whitelist when the job is
//! allowed network access, and denies all egress otherwise. All resources
//! are created idempotently (409 Conflict means an earlier controller
//! already made them), so restarts are safe.

pub mod resources;

use async_trait::async_trait;
use fm_core::{ExecutorState, JobDefinition, JobResults, JobStatus, Privacy};
use k8s_openapi::api::batch::v1::Job as K8sJob;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use serde_json::json;

use crate::{ExecutorApi, ExecutorError};
use self::resources::{
    aggregate, network_policy_name, phase_job_name, volume_claim_name, Phase, PhaseState,
};

#[derive(Debug, Clone)]
pub struct KubernetesExecutorConfig {
    pub namespace: String,
    /// Image providing the prepare/finalize tooling
    pub tool_image: String,
    /// Size of each job's workspace claim, e.g. `20Gi`
    pub volume_size: String,
    /// CIDRs the whitelist NetworkPolicy admits for network-enabled jobs
    pub egress_whitelist: Vec<String>,
    /// Registry prefixed onto unqualified image references
    pub docker_registry: String,
}

pub struct KubernetesExecutor {
    client: Client,
    config: KubernetesExecutorConfig,
}

impl KubernetesExecutor {
    pub async fn new(config: KubernetesExecutorConfig) -> Result<Self, ExecutorError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ExecutorError::Failed(format!("failed to create kube client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn jobs(&self) -> Api<K8sJob> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn claims(&self) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn policies(&self) -> Api<NetworkPolicy> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn job_name(&self, job: &JobDefinition, phase: Phase) -> String {
        phase_job_name(&job.workspace, &job.action, phase, &job.id)
    }

    fn qualified_image(&self, image: &str) -> String {
        if image.contains('/') {
            image.to_string()
        } else {
            format!("{}/{}", self.config.docker_registry.trim_end_matches('/'), image)
        }
    }

    /// Create a resource, treating an existing one as success.
    async fn create_idempotent<K>(&self, api: &Api<K>, resource: &K) -> Result<(), ExecutorError>
    where
        K: kube::Resource + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        match api.create(&PostParams::default(), resource).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(ExecutorError::Retryable(format!("kubernetes api error: {}", e))),
        }
    }

    async fn delete_ignore_missing<K>(&self, api: &Api<K>, name: &str) -> Result<(), ExecutorError>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(ExecutorError::Retryable(format!("kubernetes api error: {}", e))),
        }
    }

    async fn phase_state(&self, job: &JobDefinition, phase: Phase) -> Result<PhaseState, ExecutorError> {
        let name = self.job_name(job, phase);
        let found = self
            .jobs()
            .get_opt(&name)
            .await
            .map_err(|e| ExecutorError::Retryable(format!("kubernetes api error: {}", e)))?;
        let Some(k8s_job) = found else { return Ok(PhaseState::Unknown) };
        let status = k8s_job.status.unwrap_or_default();
        if status.succeeded.unwrap_or(0) > 0 {
            Ok(PhaseState::Succeeded)
        } else if status.failed.unwrap_or(0) > 0 {
            Ok(PhaseState::Failed)
        } else {
            Ok(PhaseState::Active)
        }
    }

    /// The pods belonging to a phase Job, newest first.
    async fn phase_pods(&self, name: &str) -> Result<Vec<Pod>, ExecutorError> {
        let params = ListParams::default().labels(&format!("job-name={}", name));
        let pods = self
            .pods()
            .list(&params)
            .await
            .map_err(|e| ExecutorError::Retryable(format!("kubernetes api error: {}", e)))?;
        Ok(pods.items)
    }

    fn tool_job(&self, job: &JobDefinition, phase: Phase) -> Result<K8sJob, ExecutorError> {
        let name = self.job_name(job, phase);
        let definition = serde_json::to_string(job)
            .map_err(|e| ExecutorError::Failed(format!("could not encode definition: {}", e)))?;
        from_json(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": name,
                "labels": { "app": "foreman", "fm-job-id": job.id },
            },
            "spec": {
                "backoffLimit": 0,
                "template": {
                    "metadata": {
                        "labels": { "app": "foreman", "fm-job-id": job.id },
                    },
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": "tool",
                            "image": self.config.tool_image,
                            "args": [phase.as_str()],
                            "env": [
                                { "name": "FM_PHASE", "value": phase.as_str() },
                                { "name": "FM_JOB_DEFINITION", "value": definition },
                            ],
                            "volumeMounts": [{ "name": "workspace", "mountPath": "/workspace" }],
                        }],
                        "volumes": [{
                            "name": "workspace",
                            "persistentVolumeClaim": {
                                "claimName": volume_claim_name(&job.workspace, &job.id),
                            },
                        }],
                    },
                },
            },
        }))
    }

    fn execute_job(&self, job: &JobDefinition) -> Result<K8sJob, ExecutorError> {
        let name = self.job_name(job, Phase::Execute);
        let env: Vec<serde_json::Value> = job
            .env
            .iter()
            .map(|(k, v)| json!({ "name": k, "value": v }))
            .collect();
        from_json(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": name,
                "labels": { "app": "foreman", "fm-job-id": job.id },
            },
            "spec": {
                "backoffLimit": 0,
                "template": {
                    "metadata": {
                        "labels": { "app": "foreman", "fm-job-id": job.id },
                    },
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            // Exit code and image digest are recovered from
                            // this container by name
                            "name": "job",
                            "image": self.qualified_image(&job.image),
                            "args": job.args,
                            "workingDir": "/workspace",
                            "env": env,
                            "volumeMounts": [{ "name": "workspace", "mountPath": "/workspace" }],
                        }],
                        "volumes": [{
                            "name": "workspace",
                            "persistentVolumeClaim": {
                                "claimName": volume_claim_name(&job.workspace, &job.id),
                            },
                        }],
                    },
                },
            },
        }))
    }

    fn volume_claim(&self, job: &JobDefinition) -> Result<PersistentVolumeClaim, ExecutorError> {
        from_json(json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": volume_claim_name(&job.workspace, &job.id),
                "labels": { "app": "foreman", "fm-job-id": job.id },
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": self.config.volume_size } },
            },
        }))
    }

    fn network_policy(&self, job: &JobDefinition) -> Result<NetworkPolicy, ExecutorError> {
        let egress = if job.allow_network_access {
            self.config
                .egress_whitelist
                .iter()
                .map(|cidr| json!({ "to": [{ "ipBlock": { "cidr": cidr } }] }))
                .collect::<Vec<_>>()
        } else {
            // An empty egress list with the Egress policy type denies all
            Vec::new()
        };
        from_json(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {
                "name": network_policy_name(&job.id),
                "labels": { "app": "foreman", "fm-job-id": job.id },
            },
            "spec": {
                "podSelector": { "matchLabels": { "fm-job-id": job.id } },
                "policyTypes": ["Egress"],
                "egress": egress,
            },
        }))
    }
}

fn from_json<K: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<K, ExecutorError> {
    serde_json::from_value(value)
        .map_err(|e| ExecutorError::Failed(format!("invalid kubernetes manifest: {}", e)))
}

#[async_trait]
impl ExecutorApi for KubernetesExecutor {
    async fn prepare(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.create_idempotent(&self.claims(), &self.volume_claim(job)?).await?;
        self.create_idempotent(&self.policies(), &self.network_policy(job)?).await?;
        self.create_idempotent(&self.jobs(), &self.tool_job(job, Phase::Prepare)?).await?;
        Ok(JobStatus::new(ExecutorState::Preparing))
    }

    async fn execute(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.create_idempotent(&self.jobs(), &self.execute_job(job)?).await?;
        Ok(JobStatus::new(ExecutorState::Executing))
    }

    async fn finalize(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        self.create_idempotent(&self.jobs(), &self.tool_job(job, Phase::Finalize)?).await?;
        Ok(JobStatus::new(ExecutorState::Finalizing))
    }

    async fn terminate(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        for phase in [Phase::Execute, Phase::Prepare] {
            self.delete_ignore_missing(&self.jobs(), &self.job_name(job, phase)).await?;
        }
        self.get_status(job).await
    }

    async fn cleanup(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        for phase in [Phase::Prepare, Phase::Execute, Phase::Finalize] {
            self.delete_ignore_missing(&self.jobs(), &self.job_name(job, phase)).await?;
        }
        self.delete_ignore_missing(&self.policies(), &network_policy_name(&job.id)).await?;
        self.delete_ignore_missing(&self.claims(), &volume_claim_name(&job.workspace, &job.id))
            .await?;
        Ok(JobStatus::new(ExecutorState::Unknown))
    }

    async fn get_status(&self, job: &JobDefinition) -> Result<JobStatus, ExecutorError> {
        let prepare = self.phase_state(job, Phase::Prepare).await?;
        let execute = self.phase_state(job, Phase::Execute).await?;
        let finalize = self.phase_state(job, Phase::Finalize).await?;
        Ok(JobStatus::new(aggregate(prepare, execute, finalize)))
    }

    async fn get_results(&self, job: &JobDefinition) -> Result<Option<JobResults>, ExecutorError> {
        if self.get_status(job).await?.state != ExecutorState::Finalized {
            return Ok(None);
        }

        // Finalize writes its results JSON to the termination message of
        // its container
        let mut results: JobResults = 'found: {
            for pod in self.phase_pods(&self.job_name(job, Phase::Finalize)).await? {
                let statuses = pod
                    .status
                    .and_then(|s| s.container_statuses)
                    .unwrap_or_default();
                for status in statuses {
                    if let Some(terminated) = status.state.and_then(|s| s.terminated) {
                        if let Some(message) = terminated.message {
                            if let Ok(results) = serde_json::from_str(&message) {
                                break 'found results;
                            }
                        }
                    }
                }
            }
            JobResults::default()
        };

        // Exit code and image digest come from the `job` container of the
        // execute pod
        for pod in self.phase_pods(&self.job_name(job, Phase::Execute)).await? {
            let statuses =
                pod.status.and_then(|s| s.container_statuses).unwrap_or_default();
            for status in statuses {
                if status.name != "job" {
                    continue;
                }
                if !status.image_id.is_empty() {
                    results.image_id = status.image_id.clone();
                }
                if let Some(terminated) = status.state.and_then(|s| s.terminated) {
                    results.exit_code = i64::from(terminated.exit_code);
                }
            }
        }

        Ok(Some(results))
    }

    async fn delete_files(
        &self,
        workspace: &str,
        privacy: Privacy,
        paths: &[String],
    ) -> Result<Vec<String>, ExecutorError> {
        // Workspace storage lives inside the cluster; out-of-band deletion
        // is handled by cluster tooling
        tracing::warn!(workspace, %privacy, count = paths.len(), "delete_files is not supported by the kubernetes executor");
        Ok(Vec::new())
    }
}
