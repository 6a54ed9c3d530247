// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output glob pattern rules.
//!
//! Patterns are matched against files produced inside the container, so the
//! grammar is deliberately tiny: relative POSIX paths and the `*` wildcard
//! only.

use fm_core::OutputSpec;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPatternError {
    #[error("contains back slashes (use forward slashes only)")]
    BackSlashes,
    #[error("contains '{0}' (only the * wildcard character is supported)")]
    UnsupportedWildcard(String),
    #[error("looks like a directory (only files should be specified)")]
    TrailingSlash,
    #[error("is not in standard form (contains double slashes or '..' elements)")]
    NotNormalised,
    #[error("should not include the metadata directory")]
    MetadataDirectory,
    #[error("is an absolute path")]
    Absolute,
}

/// Validate a single output pattern from a project file.
pub fn assert_valid_glob_pattern(pattern: &str) -> Result<(), InvalidPatternError> {
    if pattern.contains('\\') {
        return Err(InvalidPatternError::BackSlashes);
    }
    // These aren't unsafe, but they won't behave as expected so we
    // shouldn't let people use them
    for expr in ["**", "?", "["] {
        if pattern.contains(expr) {
            return Err(InvalidPatternError::UnsupportedWildcard(expr.to_string()));
        }
    }
    if pattern.ends_with('/') {
        return Err(InvalidPatternError::TrailingSlash);
    }
    if !is_normalised(pattern) {
        return Err(InvalidPatternError::NotNormalised);
    }
    if pattern == "metadata" || pattern.starts_with("metadata/") {
        return Err(InvalidPatternError::MetadataDirectory);
    }
    // Windows has a different notion of absolute paths (e.g. c:/foo) so
    // check for both platforms
    if pattern.starts_with('/') || pattern.chars().nth(1) == Some(':') {
        return Err(InvalidPatternError::Absolute);
    }
    Ok(())
}

fn is_normalised(pattern: &str) -> bool {
    !pattern.contains("//") && !pattern.split('/').any(|part| part == "." || part == "..")
}

/// The distinct parent directories implied by an output spec, in first-seen
/// order.
pub fn get_output_dirs(output_spec: &OutputSpec) -> Vec<String> {
    let mut dirs: Vec<String> = Vec::new();
    for group in output_spec.values() {
        for pattern in group.values() {
            let dir = match pattern.rsplit_once('/') {
                Some((parent, _)) => parent.to_string(),
                None => ".".to_string(),
            };
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

#[cfg(test)]
#[path = "outputs_tests.rs"]
mod outputs_tests;
