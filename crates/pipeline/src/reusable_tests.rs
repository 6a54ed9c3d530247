// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::git::FakeGit;

const ACTION_REPO: &str = "https://github.com/test-actions/safe-summary";

fn config() -> ActionsConfig {
    ActionsConfig {
        github_org: "test-actions".to_string(),
        github_org_url: "https://github.com/test-actions".to_string(),
        allowed_images: ["cohortextractor", "databuilder", "ehrql", "python", "r", "stata-mp"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

fn approved_action(git: &FakeGit, action_yaml: &[u8]) {
    git.add_ref(ACTION_REPO, "v1", "act001");
    git.add_branch_commit(ACTION_REPO, "main", "act001");
    git.add_file(ACTION_REPO, "act001", "action.yaml", action_yaml);
}

#[tokio::test]
async fn allowed_images_pass_through_untouched() {
    let git = FakeGit::new();
    let resolved = resolve_reusable_action(
        &git,
        &config(),
        "analyse",
        "python:latest python analyse.py",
    )
    .await
    .unwrap();
    assert_eq!(resolved.run_command, "python:latest python analyse.py");
    assert!(resolved.repo_url.is_none());
    assert!(resolved.commit.is_none());
}

#[tokio::test]
async fn reusable_action_is_rewritten() {
    let git = FakeGit::new();
    approved_action(&git, b"run: python:latest python -m safe_summary");

    let resolved = resolve_reusable_action(
        &git,
        &config(),
        "summarise",
        "safe-summary:v1 --input output/data.csv",
    )
    .await
    .unwrap();

    assert_eq!(
        resolved.run_command,
        "python:latest python -m safe_summary --input output/data.csv"
    );
    assert_eq!(resolved.repo_url.as_deref(), Some(ACTION_REPO));
    assert_eq!(resolved.commit.as_deref(), Some("act001"));
}

#[tokio::test]
async fn unapproved_tag_is_rejected() {
    let git = FakeGit::new();
    // Tag exists but only on a PR branch, never merged to main
    git.add_ref(ACTION_REPO, "v99", "pr0123");

    let err = resolve_reusable_action(
        &git,
        &config(),
        "summarise",
        "safe-summary:v99 --input output/data.csv",
    )
    .await
    .unwrap_err();

    assert!(err
        .to_string()
        .contains("tag 'v99' has not yet been approved for use (not merged into main branch)"));
    assert!(err.to_string().contains("summarise: safe-summary:v99"));
}

#[tokio::test]
async fn unknown_tag_is_rejected() {
    let git = FakeGit::new();
    git.add_ref(ACTION_REPO, "v1", "act001");

    let err =
        resolve_reusable_action(&git, &config(), "summarise", "safe-summary:v2").await.unwrap_err();
    assert!(err.to_string().contains("'v2' is not a tag listed in"));
}

#[tokio::test]
async fn unreachable_repo_is_reported() {
    let git = FakeGit::new();
    git.set_unreachable(ACTION_REPO);

    let err =
        resolve_reusable_action(&git, &config(), "summarise", "safe-summary:v1").await.unwrap_err();
    assert!(err.to_string().contains("could not find a repo at"));
}

#[tokio::test]
async fn missing_action_yaml_is_rejected() {
    let git = FakeGit::new();
    git.add_ref(ACTION_REPO, "v1", "act001");
    git.add_branch_commit(ACTION_REPO, "main", "act001");

    let err =
        resolve_reusable_action(&git, &config(), "summarise", "safe-summary:v1").await.unwrap_err();
    assert!(err.to_string().contains("no 'action.yaml' file present"));
}

#[tokio::test]
async fn action_with_unknown_runtime_is_rejected() {
    let git = FakeGit::new();
    approved_action(&git, b"run: homebrew-runtime:v1 do-things");

    let err =
        resolve_reusable_action(&git, &config(), "summarise", "safe-summary:v1").await.unwrap_err();
    assert!(err.to_string().contains("unrecognised runtime: homebrew-runtime"));
}

#[tokio::test]
async fn action_invoking_extraction_is_rejected() {
    let git = FakeGit::new();
    approved_action(&git, b"run: cohortextractor:latest generate_cohort");

    let err =
        resolve_reusable_action(&git, &config(), "summarise", "safe-summary:v1").await.unwrap_err();
    assert!(err.to_string().contains("cannot invoke dataset extraction"));
}

#[tokio::test]
async fn action_missing_run_key_is_rejected() {
    let git = FakeGit::new();
    approved_action(&git, b"name: no run key here");

    let err =
        resolve_reusable_action(&git, &config(), "summarise", "safe-summary:v1").await.unwrap_err();
    assert!(err.to_string().contains("missing `run` key"));
}

#[tokio::test]
async fn invalid_image_characters_are_rejected() {
    let git = FakeGit::new();
    let err = resolve_reusable_action(&git, &config(), "bad", "../escape:v1").await.unwrap_err();
    assert!(err.to_string().contains("contains invalid characters"));
}
