// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::git::FakeGit;

fn orgs(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn accepts_allowed_org() {
    validate_repo_url("https://github.com/opensafely/study", &orgs(&["opensafely"])).unwrap();
}

#[test]
fn empty_allowlist_disables_org_check() {
    validate_repo_url("https://github.com/anyone/study", &[]).unwrap();
}

#[yare::parameterized(
    http          = { "http://github.com/opensafely/study" },
    gitlab        = { "https://gitlab.com/opensafely/study" },
    bare_host     = { "https://github.com/" },
    missing_repo  = { "https://github.com/opensafely" },
    traversal     = { "https://github.com/../etc/passwd" },
)]
fn rejects_bad_urls(url: &str) {
    assert!(validate_repo_url(url, &orgs(&["opensafely"])).is_err());
}

#[test]
fn rejects_unknown_org() {
    let err =
        validate_repo_url("https://github.com/evil-corp/study", &orgs(&["opensafely"])).unwrap_err();
    assert!(matches!(err, GithubValidationError::DisallowedOrg { .. }));
}

#[tokio::test]
async fn branch_and_commit_validation() {
    let git = FakeGit::new();
    git.add_ref("https://github.com/org/repo", "main", "head00");
    git.add_branch_commit("https://github.com/org/repo", "main", "old001");

    validate_branch_and_commit(&git, "https://github.com/org/repo", "old001", "main")
        .await
        .unwrap();

    let err = validate_branch_and_commit(&git, "https://github.com/org/repo", "pr0123", "main")
        .await
        .unwrap_err();
    assert!(matches!(err, GithubValidationError::CommitNotOnBranch { .. }));

    let err = validate_branch_and_commit(&git, "https://github.com/org/repo", "head00", "")
        .await
        .unwrap_err();
    assert!(matches!(err, GithubValidationError::CommitNotOnBranch { .. }));
}
