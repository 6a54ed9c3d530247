// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! reqwest-backed client for the coordination server.

use async_trait::async_trait;
use fm_engine::{CoordinationApi, JobSnapshot, SyncError};
use std::time::Duration;

pub struct JobServerClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl JobServerClient {
    pub fn new(endpoint: &str, token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/", self.endpoint, path.trim_matches('/'))
    }
}

#[async_trait]
impl CoordinationApi for JobServerClient {
    async fn fetch_job_requests(
        &self,
        backend: &str,
        flags_header: &str,
    ) -> Result<Vec<serde_json::Value>, SyncError> {
        let response = self
            .client
            .get(self.url("job-requests"))
            .query(&[("backend", backend), ("active", "true")])
            .header("Authorization", &self.token)
            .header("Flags", flags_header)
            .send()
            .await
            .map_err(|e| SyncError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::Http(format!(
                "GET job-requests returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value =
            response.json().await.map_err(|e| SyncError::Http(e.to_string()))?;
        // Tolerate both a bare array and a paginated-style wrapper
        let results = match body {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("results") {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(SyncError::Http(
                        "unexpected job-requests response shape".to_string(),
                    ))
                }
            },
            _ => {
                return Err(SyncError::Http("unexpected job-requests response shape".to_string()))
            }
        };
        Ok(results)
    }

    async fn post_jobs(&self, snapshots: &[JobSnapshot]) -> Result<(), SyncError> {
        let response = self
            .client
            .post(self.url("jobs"))
            .header("Authorization", &self.token)
            .json(snapshots)
            .send()
            .await
            .map_err(|e| SyncError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::Http(format!("POST jobs returned {}", response.status())));
        }
        Ok(())
    }
}
