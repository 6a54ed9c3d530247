// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn builder_defaults_are_valid() {
    let request = JobRequest::builder().build();
    assert_eq!(request.id, "test-request");
    assert!(!request.requested_actions.is_empty());
    assert!(request.cancelled_actions.is_empty());
    assert!(!request.force_run_failed);
}

#[test]
fn round_trips_through_json() {
    let request = JobRequest::builder()
        .requested_actions(vec!["run_all".to_string()])
        .force_run_dependencies(true)
        .build();
    let json = serde_json::to_string(&request).unwrap();
    let parsed: JobRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, request);
}
