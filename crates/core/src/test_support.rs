// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::executor::{ExecutorState, JobDefinition, Study};
use crate::job::OutputSpec;
use indexmap::IndexMap;
use std::collections::BTreeMap;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::job::{State, StatusCode};
    use proptest::prelude::*;

    pub fn arb_state() -> impl Strategy<Value = State> {
        prop_oneof![
            Just(State::Pending),
            Just(State::Running),
            Just(State::Failed),
            Just(State::Succeeded),
        ]
    }

    pub fn arb_status_code() -> impl Strategy<Value = StatusCode> {
        prop_oneof![
            Just(StatusCode::Created),
            Just(StatusCode::WaitingOnDependencies),
            Just(StatusCode::WaitingOnWorkers),
            Just(StatusCode::WaitingOnReboot),
            Just(StatusCode::WaitingDbMaintenance),
            Just(StatusCode::WaitingPaused),
            Just(StatusCode::Preparing),
            Just(StatusCode::Prepared),
            Just(StatusCode::Executing),
            Just(StatusCode::Executed),
            Just(StatusCode::Finalizing),
            Just(StatusCode::Finalized),
            Just(StatusCode::Succeeded),
            Just(StatusCode::NonzeroExit),
            Just(StatusCode::DependencyFailed),
            Just(StatusCode::CancelledByUser),
            Just(StatusCode::KilledByAdmin),
            Just(StatusCode::InternalError),
            Just(StatusCode::JobError),
            Just(StatusCode::UnmatchedPatterns),
        ]
    }

    pub fn arb_executor_state() -> impl Strategy<Value = crate::ExecutorState> {
        use crate::ExecutorState;
        prop_oneof![
            Just(ExecutorState::Unknown),
            Just(ExecutorState::Preparing),
            Just(ExecutorState::Prepared),
            Just(ExecutorState::Executing),
            Just(ExecutorState::Executed),
            Just(ExecutorState::Finalizing),
            Just(ExecutorState::Finalized),
            Just(ExecutorState::Error),
        ]
    }
}

// ── Fixture factories ───────────────────────────────────────────────────

/// An output spec declaring a single highly-sensitive glob.
pub fn output_spec(privacy: &str, name: &str, pattern: &str) -> OutputSpec {
    let mut group = IndexMap::new();
    group.insert(name.to_string(), pattern.to_string());
    let mut spec = OutputSpec::new();
    spec.insert(privacy.to_string(), group);
    spec
}

/// A minimal JobDefinition for executor tests.
pub fn job_definition(id: &str, action: &str) -> JobDefinition {
    JobDefinition {
        id: id.to_string(),
        job_request_id: "test-request".to_string(),
        study: Study {
            repo_url: "https://github.com/test-org/study".to_string(),
            commit: "0000000000000000000000000000000000000000".to_string(),
        },
        workspace: "test-workspace".to_string(),
        action: action.to_string(),
        created_at: 1_000_000,
        image: "python:latest".to_string(),
        args: vec!["python".to_string(), "analysis.py".to_string()],
        env: BTreeMap::new(),
        inputs: Vec::new(),
        output_spec: output_spec("highly_sensitive", "dataset", "output/*.csv"),
        allow_network_access: false,
        requires_db: false,
        database_name: None,
        cancelled: false,
    }
}

/// All executor states in lifecycle order, for table-driven tests.
pub fn executor_lifecycle() -> [ExecutorState; 7] {
    [
        ExecutorState::Unknown,
        ExecutorState::Preparing,
        ExecutorState::Prepared,
        ExecutorState::Executing,
        ExecutorState::Executed,
        ExecutorState::Finalizing,
        ExecutorState::Finalized,
    ]
}
