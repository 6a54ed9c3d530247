// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reusable actions: run commands whose image is really a git repo.
//!
//! An image name outside the backend's allowed set is interpreted as
//! `repo:tag` within the trusted actions organisation. The tag is resolved
//! to a commit, checked for having been merged to `main`, and its
//! `action.yaml` entrypoint spliced in front of the study's arguments.

use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::git::GitClient;
use crate::github::validate_branch_and_commit;
use crate::model::split_image_reference;
use crate::spec::is_extraction_command;

/// Study-developer-friendly reusable action errors. Raised in preference to
/// lower-level errors because there's only so much a study developer can do
/// when something is wrong with a reusable action.
#[derive(Debug, Error)]
#[error("in '{context}' {message}")]
pub struct ReusableActionError {
    /// `<action_id>: <image:tag>`
    pub context: String,
    pub message: String,
}

/// Configuration for resolving reusable actions.
#[derive(Debug, Clone)]
pub struct ActionsConfig {
    /// GitHub organisation holding approved action repos, e.g. `opensafely-actions`
    pub github_org: String,
    /// Base URL of that organisation
    pub github_org_url: String,
    /// Image names that are runtimes rather than reusable actions
    pub allowed_images: BTreeSet<String>,
}

impl ActionsConfig {
    pub fn repo_url(&self, image: &str) -> String {
        format!("{}/{}", self.github_org_url.trim_end_matches('/'), image)
    }
}

/// A run command after reusable-action resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub run_command: String,
    /// Set only when the command resolved to a reusable action
    pub repo_url: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionFile {
    run: Option<String>,
}

/// Resolve `run_command` if it refers to a reusable action; return it
/// unchanged otherwise. `action_id` is only used to give errors context.
pub async fn resolve_reusable_action(
    git: &dyn GitClient,
    config: &ActionsConfig,
    action_id: &str,
    run_command: &str,
) -> Result<ResolvedCommand, ReusableActionError> {
    let parts = shlex::split(run_command).unwrap_or_default();
    let Some(image_ref) = parts.first() else {
        return Ok(ResolvedCommand {
            run_command: run_command.to_string(),
            repo_url: None,
            commit: None,
        });
    };
    let (name, image, tag) = split_image_reference(image_ref);
    if config.allowed_images.contains(name) {
        // This isn't a reusable action, nothing to do
        return Ok(ResolvedCommand {
            run_command: run_command.to_string(),
            repo_url: None,
            commit: None,
        });
    }

    let context = format!("{}: {}", action_id, image_ref);
    let error = |message: String| ReusableActionError { context: context.clone(), message };

    if image.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')) {
        return Err(error(format!("'{}' contains invalid characters", image)));
    }

    let repo_url = config.repo_url(image);

    // If resolving the repo fails the study developer may have made an
    // error, or the action developer may have; either way point at the
    // catalogue of available actions
    let commit = match git.resolve_ref(&repo_url, tag).await {
        Ok(sha) => sha,
        Err(crate::git::GitError::UnknownRef { .. }) => {
            return Err(error(format!("'{}' is not a tag listed in {}/tags", tag, repo_url)));
        }
        Err(_) => {
            return Err(error(format!(
                "could not find a repo at {}\nCheck that '{}' is in the list of available actions",
                repo_url, image
            )));
        }
    };

    // External collaborators can push tags but only approved work is merged
    // to main, so require the tagged commit to be reachable from it
    if validate_branch_and_commit(git, &repo_url, &commit, "main").await.is_err() {
        return Err(error(format!(
            "tag '{}' has not yet been approved for use (not merged into main branch)",
            tag
        )));
    }

    let action_file = match git.read_file(&repo_url, &commit, "action.yaml").await {
        Ok(contents) => contents,
        Err(crate::git::GitError::FileNotFound { .. }) => {
            return Err(error(format!(
                "{}/tree/{} doesn't look like a valid action (no 'action.yaml' file present)",
                repo_url, tag
            )));
        }
        Err(_) => {
            return Err(error(format!(
                "error reading '{}' from {}",
                fm_core::short(&commit, 8),
                repo_url
            )));
        }
    };

    let entrypoint = parse_action_file(&action_file, &repo_url).map_err(error)?;
    let entry_parts = shlex::split(&entrypoint).unwrap_or_default();
    if entry_parts.is_empty() {
        return Err(error(invalid_action_message(&repo_url, "empty `run` key in 'action.yaml'")));
    }
    let (entry_image, _, _) = split_image_reference(&entry_parts[0]);
    if !config.allowed_images.contains(entry_image) {
        return Err(error(invalid_action_message(
            &repo_url,
            &format!("unrecognised runtime: {}", entry_image),
        )));
    }
    if is_extraction_command(&entry_parts) {
        return Err(error(invalid_action_message(
            &repo_url,
            "reusable actions cannot invoke dataset extraction",
        )));
    }

    // ["action:tag", "arg", ...] -> ["runtime:tag", "entrypoint", ..., "arg", ...]
    let mut new_parts = entry_parts;
    new_parts.extend(parts.into_iter().skip(1));
    let run_command = shlex::try_join(new_parts.iter().map(String::as_str))
        .map_err(|_| error("could not re-quote resolved run command".to_string()))?;

    Ok(ResolvedCommand { run_command, repo_url: Some(repo_url), commit: Some(commit) })
}

fn parse_action_file(contents: &[u8], repo_url: &str) -> Result<String, String> {
    let parsed: Result<ActionFile, _> = serde_yaml::from_slice(contents);
    match parsed {
        Ok(ActionFile { run: Some(run) }) => Ok(run),
        Ok(ActionFile { run: None }) => {
            Err(invalid_action_message(repo_url, "missing `run` key in 'action.yaml'"))
        }
        Err(e) => Err(invalid_action_message(repo_url, &format!("could not parse action.yaml: {}", e))),
    }
}

fn invalid_action_message(repo_url: &str, detail: &str) -> String {
    format!("invalid action, please open an issue on {}/issues\n\n  {}", repo_url, detail)
}

#[cfg(test)]
#[path = "reusable_tests.rs"]
mod reusable_tests;
