// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin wrapper over the host `docker` CLI.

use serde_json::Value;
use std::time::Duration;

use crate::subprocess::{args, run_ok, run_with_timeout, RUNTIME_COMMAND_TIMEOUT};
use crate::ExecutorError;

/// Label applied to every container we create, so strays can be identified.
pub const CONTAINER_LABEL: &str = "foreman";

pub fn container_name(job_id: &str) -> String {
    format!("fm-job-{}", job_id)
}

/// What we need to know about a container, when it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub running: bool,
    pub exit_code: i64,
    /// Image digest, e.g. `sha256:...`
    pub image_id: String,
}

/// Inspect a container. `None` when no such container exists.
pub async fn inspect(name: &str) -> Result<Option<ContainerInfo>, ExecutorError> {
    let output = run_with_timeout(
        "docker",
        &args(&["inspect", name]),
        RUNTIME_COMMAND_TIMEOUT,
    )
    .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such object") || stderr.contains("No such container") {
            return Ok(None);
        }
        // The daemon being down is transient from the controller's point
        // of view
        return Err(ExecutorError::Retryable(format!("docker inspect failed: {}", stderr.trim())));
    }
    let parsed: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| ExecutorError::Failed(format!("unparseable docker inspect output: {}", e)))?;
    let Some(entry) = parsed.as_array().and_then(|entries| entries.first()) else {
        return Ok(None);
    };
    Ok(Some(ContainerInfo {
        running: entry["State"]["Running"].as_bool().unwrap_or(false),
        exit_code: entry["State"]["ExitCode"].as_i64().unwrap_or(-1),
        image_id: entry["Image"].as_str().unwrap_or_default().to_string(),
    }))
}

/// `docker run -d` returning the container id.
pub async fn run_detached(run_args: &[String]) -> Result<(), ExecutorError> {
    let mut full = args(&["run", "--detach"]);
    full.extend(run_args.iter().cloned());
    run_ok("docker", &full, RUNTIME_COMMAND_TIMEOUT).await?;
    Ok(())
}

/// Kill a running container. Missing containers are not an error.
pub async fn kill(name: &str) -> Result<(), ExecutorError> {
    let output =
        run_with_timeout("docker", &args(&["kill", name]), RUNTIME_COMMAND_TIMEOUT).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains("No such container") && !stderr.contains("is not running") {
            return Err(ExecutorError::Failed(format!("docker kill failed: {}", stderr.trim())));
        }
    }
    Ok(())
}

/// Remove a container (and anonymous volumes). Missing containers are fine.
pub async fn remove(name: &str) -> Result<(), ExecutorError> {
    let output = run_with_timeout(
        "docker",
        &args(&["rm", "--force", "--volumes", name]),
        RUNTIME_COMMAND_TIMEOUT,
    )
    .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains("No such container") {
            return Err(ExecutorError::Failed(format!("docker rm failed: {}", stderr.trim())));
        }
    }
    Ok(())
}

/// Full combined logs of a container.
pub async fn logs(name: &str) -> Result<Vec<u8>, ExecutorError> {
    let output = run_with_timeout(
        "docker",
        &args(&["logs", "--timestamps", name]),
        Duration::from_secs(300),
    )
    .await?;
    if !output.status.success() {
        return Err(ExecutorError::Failed(format!(
            "docker logs failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    // Docker interleaves the streams; keep both
    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(combined)
}
