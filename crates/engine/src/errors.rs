// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The flat expansion-error taxonomy.
//!
//! Every variant is fatal to its JobRequest and harmless to the controller:
//! each becomes a single synthetic job so the coordination server can show
//! the message to the study developer.

use fm_pipeline::{GitError, GithubValidationError, ProjectError, ReusableActionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Github(#[from] GithubValidationError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Reusable(#[from] ReusableActionError),
    #[error("{0}")]
    JobRequest(String),
    /// Everything already ran; reported back as a success
    #[error("All actions have already run")]
    NothingToDo,
}

impl ExpansionError {
    /// The error-kind label prefixed onto synthetic job messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ExpansionError::Git(_) => "GitError",
            ExpansionError::Github(_) => "GithubValidationError",
            ExpansionError::Project(_) => "ProjectValidationError",
            ExpansionError::Reusable(_) => "ReusableActionError",
            ExpansionError::JobRequest(_) => "JobRequestError",
            ExpansionError::NothingToDo => "NothingToDoError",
        }
    }

    /// Whether the full message is safe to report outside the backend.
    /// Everything in this taxonomy is study-developer-oriented by
    /// construction.
    pub fn is_safe_to_report(&self) -> bool {
        true
    }
}
