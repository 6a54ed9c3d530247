// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic Kubernetes resource naming and phase-state aggregation.
//!
//! Pure functions, separated from the client so the mapping table is
//! testable without a cluster.

use fm_core::ExecutorState;
use sha1::{Digest, Sha1};

/// The three Kubernetes Jobs realising one controller job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Execute,
    Finalize,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Execute => "execute",
            Phase::Finalize => "finalize",
        }
    }
}

/// Observed state of one phase Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    /// The Job does not exist
    Unknown,
    /// Pending or running
    Active,
    Succeeded,
    Failed,
}

/// Aggregate the three phase Jobs into a single executor state.
pub fn aggregate(prepare: PhaseState, execute: PhaseState, finalize: PhaseState) -> ExecutorState {
    use PhaseState::*;
    match (prepare, execute, finalize) {
        (Unknown, _, _) => ExecutorState::Unknown,
        (Active, _, _) => ExecutorState::Preparing,
        (Failed, _, _) => ExecutorState::Error,
        (Succeeded, Unknown, _) => ExecutorState::Prepared,
        (Succeeded, Active, _) => ExecutorState::Executing,
        (Succeeded, Failed, _) => ExecutorState::Error,
        (Succeeded, Succeeded, Unknown) => ExecutorState::Executed,
        (Succeeded, Succeeded, Active) => ExecutorState::Finalizing,
        (Succeeded, Succeeded, Succeeded) => ExecutorState::Finalized,
        (Succeeded, Succeeded, Failed) => ExecutorState::Error,
    }
}

/// Max length of a Kubernetes resource name.
const MAX_NAME: usize = 63;

/// `{workspace}-{action}-{phase}-{hash}`, sanitised to a valid DNS-1123
/// label. The hash is over the job ID, so names are stable across controller
/// restarts and never collide between jobs.
pub fn phase_job_name(workspace: &str, action: &str, phase: Phase, job_id: &str) -> String {
    let digest = Sha1::digest(job_id.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    let stem = format!("{}-{}-{}", sanitize(workspace), sanitize(action), phase.as_str());
    let budget = MAX_NAME - hash.len() - 1;
    let stem = truncated(&stem, budget);
    format!("{}-{}", stem, hash)
}

/// Deterministic PVC name shared by the three phase Jobs.
pub fn volume_claim_name(workspace: &str, job_id: &str) -> String {
    let digest = Sha1::digest(job_id.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    let stem = truncated(&format!("{}-volume", sanitize(workspace)), MAX_NAME - hash.len() - 1);
    format!("{}-{}", stem, hash)
}

/// Per-job NetworkPolicy name.
pub fn network_policy_name(job_id: &str) -> String {
    format!("fm-job-netpol-{}", sanitize(job_id))
}

fn sanitize(value: &str) -> String {
    let mut out: String = value
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while out.starts_with('-') {
        out.remove(0);
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push('x');
    }
    out
}

fn truncated(value: &str, max: usize) -> String {
    let mut out: String = value.chars().take(max).collect();
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
