// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn executor_state_wire_format() {
    assert_eq!(ExecutorState::Unknown.to_string(), "unknown");
    assert_eq!(serde_json::to_string(&ExecutorState::Finalizing).unwrap(), "\"finalizing\"");
}

#[test]
fn privacy_display_matches_project_file_levels() {
    assert!(PRIVACY_LEVELS.contains(&Privacy::HighlySensitive.to_string().as_str()));
    assert!(PRIVACY_LEVELS.contains(&Privacy::ModeratelySensitive.to_string().as_str()));
}

#[test]
fn job_status_constructors() {
    let status = JobStatus::new(ExecutorState::Prepared);
    assert_eq!(status.state, ExecutorState::Prepared);
    assert!(status.message.is_none());

    let status = JobStatus::with_message(ExecutorState::Error, "docker daemon unreachable");
    assert_eq!(status.message.as_deref(), Some("docker daemon unreachable"));
}

#[test]
fn job_results_default_is_clean_exit_shape() {
    let results = JobResults::default();
    assert_eq!(results.exit_code, 0);
    assert!(results.outputs.is_empty());
    assert!(results.unmatched_patterns.is_empty());
}
