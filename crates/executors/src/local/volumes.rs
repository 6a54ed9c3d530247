// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job volume directories and output harvesting.
//!
//! Each job gets an ephemeral directory under the high-privacy base which is
//! bind-mounted as the container's working directory. On finalization,
//! produced files are matched against the job's output spec and copied into
//! the long-lived workspace directories by privacy level.

use fm_core::{JobDefinition, JobResults};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ExecutorError;

/// Book-keeping directory inside each volume; never treated as job output.
pub const INTERNAL_DIR: &str = ".foreman";

/// Files present after preparation (study code + inputs); everything else
/// seen at finalization was produced by the job.
#[derive(Debug, Serialize, Deserialize)]
pub struct InitialManifest {
    pub files: Vec<String>,
}

/// What finalization computed about a job's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMatches {
    /// filename → privacy level
    pub outputs: BTreeMap<String, String>,
    pub unmatched_patterns: Vec<String>,
    pub unmatched_outputs: Vec<String>,
}

/// Match produced files against the job's output spec.
pub fn match_outputs(definition: &JobDefinition, produced: &[String]) -> OutputMatches {
    let mut outputs = BTreeMap::new();
    let mut unmatched_patterns = Vec::new();

    for (privacy, group) in &definition.output_spec {
        for pattern_text in group.values() {
            let matcher = glob::Pattern::new(pattern_text).ok();
            let mut matched_any = false;
            for file in produced {
                let matches = match &matcher {
                    Some(pattern) => pattern.matches(file),
                    None => file == pattern_text,
                };
                if matches {
                    outputs.insert(file.clone(), privacy.clone());
                    matched_any = true;
                }
            }
            if !matched_any {
                unmatched_patterns.push(pattern_text.clone());
            }
        }
    }

    let unmatched_outputs = if unmatched_patterns.is_empty() {
        Vec::new()
    } else {
        produced.iter().filter(|file| !outputs.contains_key(*file)).cloned().collect()
    };

    OutputMatches { outputs, unmatched_patterns, unmatched_outputs }
}

/// List every file under `dir` as a relative forward-slash path, skipping
/// the internal book-keeping directory and the checked-out `.git`.
pub fn list_files(dir: &Path) -> Result<Vec<String>, ExecutorError> {
    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(base: &Path, dir: &Path, files: &mut Vec<String>) -> Result<(), ExecutorError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if path.is_dir() {
            if name == INTERNAL_DIR || name == ".git" {
                continue;
            }
            walk(base, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

/// Copy `relative` from `from_base` into `to_base`, creating parents.
pub fn copy_file(from_base: &Path, to_base: &Path, relative: &str) -> Result<(), ExecutorError> {
    let source = from_base.join(relative);
    let target = to_base.join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&source, &target)?;
    Ok(())
}

/// Copy matched outputs into the workspace directories by privacy level.
/// Highly sensitive files stay under the high-privacy base; everything else
/// (moderately or minimally sensitive) is released to the medium one.
pub fn publish_outputs(
    volume: &Path,
    high_workspace: &Path,
    medium_workspace: &Path,
    outputs: &BTreeMap<String, String>,
) -> Result<(), ExecutorError> {
    for (file, privacy) in outputs {
        let target_base =
            if privacy == "highly_sensitive" { high_workspace } else { medium_workspace };
        copy_file(volume, target_base, file)?;
    }
    Ok(())
}

/// Serialise results next to the volume so `get_results` survives restarts.
pub fn write_results(volume: &Path, results: &JobResults) -> Result<(), ExecutorError> {
    let dir = volume.join(INTERNAL_DIR);
    std::fs::create_dir_all(&dir)?;
    let encoded = serde_json::to_vec_pretty(results)
        .map_err(|e| ExecutorError::Failed(format!("could not encode results: {}", e)))?;
    std::fs::write(dir.join("results.json"), encoded)?;
    Ok(())
}

pub fn read_results(volume: &Path) -> Result<Option<JobResults>, ExecutorError> {
    let path = volume.join(INTERNAL_DIR).join("results.json");
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(&path)?;
    let results = serde_json::from_slice(&raw)
        .map_err(|e| ExecutorError::Failed(format!("corrupt results file: {}", e)))?;
    Ok(Some(results))
}

pub fn write_initial_manifest(volume: &Path, files: Vec<String>) -> Result<(), ExecutorError> {
    let dir = volume.join(INTERNAL_DIR);
    std::fs::create_dir_all(&dir)?;
    let manifest = InitialManifest { files };
    let encoded = serde_json::to_vec(&manifest)
        .map_err(|e| ExecutorError::Failed(format!("could not encode manifest: {}", e)))?;
    std::fs::write(dir.join("initial_files.json"), encoded)?;
    Ok(())
}

pub fn read_initial_manifest(volume: &Path) -> Result<Vec<String>, ExecutorError> {
    let path = volume.join(INTERNAL_DIR).join("initial_files.json");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read(&path)?;
    let manifest: InitialManifest = serde_json::from_slice(&raw)
        .map_err(|e| ExecutorError::Failed(format!("corrupt manifest file: {}", e)))?;
    Ok(manifest.files)
}

/// Marker recording that preparation completed.
pub fn prepared_marker(volume: &Path) -> PathBuf {
    volume.join(INTERNAL_DIR).join("prepared")
}

#[cfg(test)]
#[path = "volumes_tests.rs"]
mod volumes_tests;
