// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolving an action to its concrete container invocation.

use serde::{Deserialize, Serialize};

use crate::model::{split_image_reference, Pipeline, ProjectError};
use crate::outputs::get_output_dirs;

/// The fully resolved invocation for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpecification {
    /// Shell-quoted single-string run command
    pub run: String,
    pub needs: Vec<String>,
    pub outputs: fm_core::OutputSpec,
}

/// Dataset/cohort extraction commands get special treatment in various
/// places (they are the only commands which get database access), so the
/// version split lives in one function.
///
/// v1 is specifically `cohortextractor generate_cohort`; other subcommands
/// run under that image are ordinary actions. v2 covers its successors.
pub fn extraction_command_version(parts: &[String]) -> Option<u8> {
    let image = parts.first()?;
    let (name, _, _) = split_image_reference(image);
    match name {
        "cohortextractor" if parts.get(1).map(String::as_str) == Some("generate_cohort") => {
            Some(1)
        }
        "databuilder" | "ehrql" => Some(2),
        _ => None,
    }
}

pub fn is_extraction_command(parts: &[String]) -> bool {
    extraction_command_version(parts).is_some()
}

fn args_include(args: &[String], target: &str) -> bool {
    args.iter().any(|arg| arg == target || arg.starts_with(&format!("{}=", target)))
}

/// Produce the concrete run command for `action_id`.
///
/// Appends `--config` JSON where the action declares config, and fixes up
/// extraction commands for dummy-data backends.
pub fn get_action_specification(
    pipeline: &Pipeline,
    action_id: &str,
    using_dummy_data_backend: bool,
) -> Result<ActionSpecification, ProjectError> {
    let action = pipeline.action(action_id)?;
    let mut run_parts = action.run.clone();

    if let Some(config) = &action.config {
        // For commands that require complex config, users can supply a
        // `config` key in project.yaml. We serialize this as JSON and pass
        // it with the --config flag; single quotes are escaped so the value
        // survives the shell-quoted round trip.
        run_parts.push("--config".to_string());
        run_parts.push(config.to_string().replace('\'', "\\u0027"));
    }

    match extraction_command_version(&run_parts) {
        Some(1) => {
            if using_dummy_data_backend {
                match &action.dummy_data_file {
                    Some(path) => run_parts.push(format!("--dummy-data-file={}", path)),
                    None => run_parts
                        .push(format!("--expectations-population={}", pipeline.population_size)),
                }
            }
            let output_dirs = get_output_dirs(&action.outputs);
            if output_dirs.len() == 1 {
                run_parts.push(format!("--output-dir={}", output_dirs[0]));
            } else if !args_include(&run_parts, "--output-dir") {
                return Err(ProjectError::MultipleOutputDirs(output_dirs.len()));
            }
        }
        Some(2) => {
            // v2 expects all command line arguments in the run command itself
            if using_dummy_data_backend && !args_include(&run_parts, "--dummy-data-file") {
                return Err(ProjectError::DummyDataFileRequired);
            }
        }
        _ => {}
    }

    let run = shlex::try_join(run_parts.iter().map(String::as_str)).map_err(|_| {
        ProjectError::InvalidRunCommand {
            action: action_id.to_string(),
            command: run_parts.join(" "),
        }
    })?;

    Ok(ActionSpecification { run, needs: action.needs.clone(), outputs: action.outputs.clone() })
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod spec_tests;
