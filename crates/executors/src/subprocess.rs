// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess helper for runtime CLIs.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::ExecutorError;

pub const RUNTIME_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Run a command to completion with a timeout, capturing output. A timeout
/// or spawn failure is an executor failure; a nonzero exit is returned to
/// the caller for interpretation.
pub async fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<std::process::Output, ExecutorError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            ExecutorError::Failed(format!("{} {} timed out", program, args.join(" ")))
        })?
        .map_err(|e| ExecutorError::Failed(format!("failed to run {}: {}", program, e)))?;
    Ok(output)
}

/// Like [`run_with_timeout`] but requiring a zero exit status.
pub async fn run_ok(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<std::process::Output, ExecutorError> {
    let output = run_with_timeout(program, args, timeout).await?;
    if !output.status.success() {
        return Err(ExecutorError::Failed(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

/// Convenience for building `Vec<String>` argument lists.
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
