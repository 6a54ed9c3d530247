// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provenance checks for externally supplied repo URLs and commits.

use thiserror::Error;

use crate::git::{GitClient, GitError};

#[derive(Debug, Error)]
pub enum GithubValidationError {
    #[error("Repository URLs must start with https://github.com/")]
    NotGithubHttps { url: String },
    #[error("Repositories must belong to one of the following organisations: {allowed}")]
    DisallowedOrg { url: String, allowed: String },
    #[error("Invalid repository URL: {url}")]
    InvalidUrl { url: String },
    #[error("Could not find commit on branch '{branch}': {commit}")]
    CommitNotOnBranch { commit: String, branch: String },
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Check the URL is an https github.com URL inside an allowed organisation.
/// An empty `allowed_orgs` list disables the org restriction.
pub fn validate_repo_url(repo_url: &str, allowed_orgs: &[String]) -> Result<(), GithubValidationError> {
    let rest = repo_url.strip_prefix("https://github.com/").ok_or_else(|| {
        GithubValidationError::NotGithubHttps { url: repo_url.to_string() }
    })?;
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let org = segments.next().ok_or_else(|| GithubValidationError::InvalidUrl {
        url: repo_url.to_string(),
    })?;
    let repo = segments.next().ok_or_else(|| GithubValidationError::InvalidUrl {
        url: repo_url.to_string(),
    })?;
    // These end up as path components; refuse anything that could traverse
    for segment in [org, repo] {
        if segment == "." || segment == ".." || segment.contains('\\') {
            return Err(GithubValidationError::InvalidUrl { url: repo_url.to_string() });
        }
    }
    if !allowed_orgs.is_empty() && !allowed_orgs.iter().any(|allowed| allowed == org) {
        return Err(GithubValidationError::DisallowedOrg {
            url: repo_url.to_string(),
            allowed: allowed_orgs.join(", "),
        });
    }
    Ok(())
}

/// Check that `commit` has actually been merged to `branch`, so a commit
/// from an unreviewed PR can never be executed.
pub async fn validate_branch_and_commit(
    git: &dyn GitClient,
    repo_url: &str,
    commit: &str,
    branch: &str,
) -> Result<(), GithubValidationError> {
    if branch.is_empty() {
        return Err(GithubValidationError::CommitNotOnBranch {
            commit: commit.to_string(),
            branch: "(empty)".to_string(),
        });
    }
    if git.commit_reachable_from(repo_url, commit, branch).await? {
        Ok(())
    } else {
        Err(GithubValidationError::CommitNotOnBranch {
            commit: commit.to_string(),
            branch: branch.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod github_tests;
