// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! project.yaml parsing and validation.

use fm_core::{OutputSpec, PRIVACY_LEVELS};
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::outputs::{assert_valid_glob_pattern, InvalidPatternError};
use crate::spec::is_extraction_command;

/// The magic action name which means "run every action".
pub const RUN_ALL: &str = "run_all";

/// The project file version where each feature was introduced.
const VERSION_UNIQUE_OUTPUT_PATH: f64 = 2.0;
const VERSION_EXPECTATIONS_POPULATION: f64 = 3.0;
const LATEST_VERSION: f64 = 3.0;

const DEFAULT_POPULATION_SIZE: u64 = 1000;

/// Errors raised while parsing or validating a project file. Fatal to the
/// JobRequest, never to the controller; the message is shown to the study
/// developer.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("could not parse project.yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("project file must have a `version` attribute specifying which version of the \
             project configuration format it uses (current latest version is {LATEST_VERSION})")]
    MissingVersion,
    #[error("`version` must be a number between 1 and {LATEST_VERSION}")]
    InvalidVersion,
    #[error("project must include an `expectations` section with a `population_size`")]
    MissingExpectations,
    #[error("project expectations population size must be a number")]
    InvalidPopulationSize,
    #[error("action '{action}' has an invalid run command '{command}'")]
    InvalidRunCommand { action: String, command: String },
    #[error("{image} must have a version specified (e.g. {image}:v2)")]
    UnversionedImage { image: String },
    #[error("{command} appears more than once")]
    DuplicateRunCommand { command: String },
    #[error("'{level}' is not a valid output privacy level (must be one of {})",
            PRIVACY_LEVELS.join(", "))]
    InvalidPrivacyLevel { level: String },
    #[error("output path {pattern} is not permitted: {reason}")]
    InvalidOutputPattern { pattern: String, reason: InvalidPatternError },
    #[error("output path {pattern} is not unique")]
    DuplicateOutputPattern { pattern: String },
    #[error("action '{action}' lists unknown action '{dependency}' in its `needs` config")]
    UnknownDependency { action: String, dependency: String },
    #[error("`needs` actions in '{action}' should be separated with commas: {dependency}")]
    UnseparatedDependencies { action: String, dependency: String },
    #[error("action '{action}' not found in project.yaml")]
    UnknownAction { action: String },
    #[error("an extraction action must have exactly one output; {action} had {count}")]
    ExtractionOutputCount { action: String, count: usize },
    #[error("generate_cohort command should produce output in only one directory, found {0}")]
    MultipleOutputDirs(usize),
    #[error("--dummy-data-file is required for a local run")]
    DummyDataFileRequired,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    version: Option<serde_yaml::Value>,
    expectations: Option<RawExpectations>,
    actions: IndexMap<String, RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawExpectations {
    population_size: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    run: String,
    #[serde(default)]
    needs: Vec<String>,
    outputs: OutputSpec,
    config: Option<serde_json::Value>,
    dummy_data_file: Option<String>,
}

/// A validated action: its run command pre-tokenised, dependencies known to
/// exist, outputs checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Tokenised run command; first token is always `image:tag`
    pub run: Vec<String>,
    pub needs: Vec<String>,
    pub outputs: OutputSpec,
    pub config: Option<serde_json::Value>,
    pub dummy_data_file: Option<String>,
}

/// A validated project pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub version: f64,
    pub population_size: u64,
    pub actions: IndexMap<String, Action>,
}

impl Pipeline {
    /// Every real action ID in file order. Any manually defined `run_all`
    /// is ignored.
    pub fn all_actions(&self) -> Vec<String> {
        self.actions.keys().filter(|id| *id != RUN_ALL).cloned().collect()
    }

    pub fn action(&self, action_id: &str) -> Result<&Action, ProjectError> {
        self.actions
            .get(action_id)
            .ok_or_else(|| ProjectError::UnknownAction { action: action_id.to_string() })
    }
}

/// Parse and validate a project file, applying version-dependent defaults.
pub fn parse_and_validate_project_file(project_file: &[u8]) -> Result<Pipeline, ProjectError> {
    let raw: RawProject = serde_yaml::from_slice(project_file)?;
    validate(raw)
}

fn parse_version(raw: &RawProject) -> Result<f64, ProjectError> {
    let value = raw.version.as_ref().ok_or(ProjectError::MissingVersion)?;
    let version = match value {
        serde_yaml::Value::Number(n) => n.as_f64(),
        serde_yaml::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or(ProjectError::InvalidVersion)?;
    if !(1.0..=LATEST_VERSION).contains(&version) {
        return Err(ProjectError::InvalidVersion);
    }
    Ok(version)
}

fn parse_population_size(raw: &RawProject, version: f64) -> Result<u64, ProjectError> {
    if version < VERSION_EXPECTATIONS_POPULATION {
        return Ok(DEFAULT_POPULATION_SIZE);
    }
    let expectations = raw.expectations.as_ref().ok_or(ProjectError::MissingExpectations)?;
    let value = expectations.population_size.as_ref().ok_or(ProjectError::MissingExpectations)?;
    match value {
        serde_yaml::Value::Number(n) => n.as_u64(),
        serde_yaml::Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
    .ok_or(ProjectError::InvalidPopulationSize)
}

fn validate(raw: RawProject) -> Result<Pipeline, ProjectError> {
    let version = parse_version(&raw)?;
    let population_size = parse_population_size(&raw, version)?;

    let action_ids: Vec<String> = raw.actions.keys().cloned().collect();
    let mut seen_runs: Vec<String> = Vec::new();
    let mut seen_output_patterns: Vec<String> = Vec::new();
    let mut actions = IndexMap::new();

    for (action_id, raw_action) in raw.actions {
        let parts = shlex::split(&raw_action.run).filter(|p| !p.is_empty()).ok_or_else(|| {
            ProjectError::InvalidRunCommand {
                action: action_id.clone(),
                command: raw_action.run.clone(),
            }
        })?;
        let Some(image) = parts.first() else {
            return Err(ProjectError::InvalidRunCommand {
                action: action_id.clone(),
                command: raw_action.run.clone(),
            });
        };

        let (name, _, tag) = split_image_reference(image);
        if tag.is_empty() {
            return Err(ProjectError::UnversionedImage { image: name.to_string() });
        }

        if is_extraction_command(&parts) && raw_action.outputs.len() != 1 {
            return Err(ProjectError::ExtractionOutputCount {
                action: action_id.clone(),
                count: raw_action.outputs.len(),
            });
        }

        for (privacy_level, group) in &raw_action.outputs {
            if !PRIVACY_LEVELS.contains(&privacy_level.as_str()) {
                return Err(ProjectError::InvalidPrivacyLevel { level: privacy_level.clone() });
            }
            for pattern in group.values() {
                assert_valid_glob_pattern(pattern).map_err(|reason| {
                    ProjectError::InvalidOutputPattern { pattern: pattern.clone(), reason }
                })?;
                if version >= VERSION_UNIQUE_OUTPUT_PATH
                    && seen_output_patterns.contains(pattern)
                {
                    return Err(ProjectError::DuplicateOutputPattern {
                        pattern: pattern.clone(),
                    });
                }
                seen_output_patterns.push(pattern.clone());
            }
        }

        // The same command with the same arguments can only produce the same
        // outputs, so a repeat is always a project-file mistake
        let run_signature = parts.join(" ");
        if seen_runs.contains(&run_signature) {
            return Err(ProjectError::DuplicateRunCommand { command: run_signature });
        }
        seen_runs.push(run_signature);

        for dependency in &raw_action.needs {
            if !action_ids.contains(dependency) {
                if dependency.contains(' ') {
                    return Err(ProjectError::UnseparatedDependencies {
                        action: action_id.clone(),
                        dependency: dependency.split_whitespace().collect::<Vec<_>>().join(", "),
                    });
                }
                return Err(ProjectError::UnknownDependency {
                    action: action_id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        actions.insert(
            action_id,
            Action {
                run: parts,
                needs: raw_action.needs,
                outputs: raw_action.outputs,
                config: raw_action.config,
                dummy_data_file: raw_action.dummy_data_file,
            },
        );
    }

    Ok(Pipeline { version, population_size, actions })
}

/// Split `registry/name:tag` into (name, registry-qualified name, tag).
/// The registry part is preserved but plays no role in validation.
pub fn split_image_reference(image: &str) -> (&str, &str, &str) {
    let (full_name, tag) = image.rsplit_once(':').unwrap_or((image, ""));
    let name = full_name.rsplit('/').next().unwrap_or(full_name);
    (name, full_name, tag)
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
