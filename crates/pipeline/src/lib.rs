// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-pipeline: the project file and everything derived from it.
//!
//! Parses and validates `project.yaml`, resolves actions to concrete
//! container invocations, talks to git for study code and reusable actions,
//! and enforces GitHub provenance rules.

pub mod git;
pub mod github;
pub mod model;
pub mod outputs;
pub mod reusable;
pub mod spec;

#[cfg(any(test, feature = "test-support"))]
pub use git::FakeGit;
pub use git::{CliGit, GitClient, GitError};
pub use github::{validate_branch_and_commit, validate_repo_url, GithubValidationError};
pub use model::{parse_and_validate_project_file, Action, Pipeline, ProjectError, RUN_ALL};
pub use outputs::{assert_valid_glob_pattern, get_output_dirs, InvalidPatternError};
pub use reusable::{resolve_reusable_action, ActionsConfig, ReusableActionError, ResolvedCommand};
pub use spec::{
    extraction_command_version, get_action_specification, is_extraction_command,
    ActionSpecification,
};
