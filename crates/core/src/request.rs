// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JobRequest: an externally-submitted request to run actions in a workspace.

use serde::{Deserialize, Serialize};

/// Received from the coordination server and immutable once stored. Only the
/// opaque `original` payload is persisted; the typed fields live for the
/// duration of expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: String,
    pub repo_url: String,
    /// Full commit sha; resolved from `branch` when the server omits it
    pub commit: Option<String>,
    pub branch: String,
    /// Ordered and non-empty; may contain the `run_all` sentinel
    pub requested_actions: Vec<String>,
    pub cancelled_actions: Vec<String>,
    pub workspace: String,
    pub database_name: String,
    pub backend: String,
    pub force_run_dependencies: bool,
    pub force_run_failed: bool,
    /// The source payload exactly as received, stored for audit
    pub original: serde_json::Value,
}

crate::builder! {
    pub struct JobRequestBuilder => JobRequest {
        into {
            id: String = "test-request",
            repo_url: String = "https://github.com/test-org/study",
            branch: String = "main",
            workspace: String = "test-workspace",
            database_name: String = "dummy",
            backend: String = "test-backend",
        }
        set {
            commit: Option<String> = Some("0000000000000000000000000000000000000000".to_string()),
            requested_actions: Vec<String> = vec!["action".to_string()],
            cancelled_actions: Vec<String> = Vec::new(),
            force_run_dependencies: bool = false,
            force_run_failed: bool = false,
        }
        computed {
            original: serde_json::Value = serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod request_tests;
