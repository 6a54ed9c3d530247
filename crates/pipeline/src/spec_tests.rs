// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::parse_and_validate_project_file;

fn pipeline(yaml: &str) -> Pipeline {
    parse_and_validate_project_file(yaml.as_bytes()).unwrap()
}

#[test]
fn plain_action_passes_through() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  analyse:
    run: python:latest python analyse.py --input data.csv
    outputs: {moderately_sensitive: {report: out/report.txt}}
"#,
    );
    let spec = get_action_specification(&pipeline, "analyse", false).unwrap();
    assert_eq!(spec.run, "python:latest python analyse.py --input data.csv");
    assert!(spec.needs.is_empty());
}

#[test]
fn config_is_appended_as_json() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  report:
    run: python:latest python report.py
    config:
      title: "Jan's report"
    outputs: {moderately_sensitive: {report: out/report.txt}}
"#,
    );
    let spec = get_action_specification(&pipeline, "report", false).unwrap();
    // Single quotes in the JSON are escaped so they survive shell quoting
    assert!(spec.run.starts_with("python:latest python report.py --config "));
    assert!(spec.run.contains("\\u0027"));
    assert!(!spec.run.contains("Jan's"));
}

#[test]
fn v1_extraction_gets_expectations_population_on_dummy_backend() {
    let pipeline = pipeline(
        r#"
version: 3
expectations: {population_size: 500}
actions:
  generate_cohort:
    run: cohortextractor:latest generate_cohort
    outputs: {highly_sensitive: {cohort: output/input.csv}}
"#,
    );
    let spec = get_action_specification(&pipeline, "generate_cohort", true).unwrap();
    assert!(spec.run.contains("--expectations-population=500"));
    assert!(spec.run.contains("--output-dir=output"));
}

#[test]
fn v1_extraction_prefers_dummy_data_file() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  generate_cohort:
    run: cohortextractor:latest generate_cohort
    dummy_data_file: dummy.csv
    outputs: {highly_sensitive: {cohort: output/input.csv}}
"#,
    );
    let spec = get_action_specification(&pipeline, "generate_cohort", true).unwrap();
    assert!(spec.run.contains("--dummy-data-file=dummy.csv"));
    assert!(!spec.run.contains("--expectations-population"));
}

#[test]
fn v1_extraction_without_dummy_backend_gets_no_population() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  generate_cohort:
    run: cohortextractor:latest generate_cohort
    outputs: {highly_sensitive: {cohort: output/input.csv}}
"#,
    );
    let spec = get_action_specification(&pipeline, "generate_cohort", false).unwrap();
    assert!(!spec.run.contains("--expectations-population"));
    assert!(spec.run.contains("--output-dir=output"));
}

#[test]
fn v2_extraction_requires_dummy_data_file_on_dummy_backend() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  generate_dataset:
    run: ehrql:v1 generate-dataset dataset.py --output=output/ds.csv
    outputs: {highly_sensitive: {dataset: output/ds.csv}}
"#,
    );
    let err = get_action_specification(&pipeline, "generate_dataset", true).unwrap_err();
    assert!(matches!(err, ProjectError::DummyDataFileRequired));

    // Fine when not a dummy-data backend
    let spec = get_action_specification(&pipeline, "generate_dataset", false).unwrap();
    assert_eq!(spec.run, "ehrql:v1 generate-dataset dataset.py --output=output/ds.csv");
}

#[test]
fn v2_extraction_with_dummy_data_file_is_unchanged() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  generate_dataset:
    run: databuilder:v2 generate-dataset dataset.py --dummy-data-file=dummy.csv
    outputs: {highly_sensitive: {dataset: output/ds.csv}}
"#,
    );
    let spec = get_action_specification(&pipeline, "generate_dataset", true).unwrap();
    assert_eq!(
        spec.run,
        "databuilder:v2 generate-dataset dataset.py --dummy-data-file=dummy.csv"
    );
}

#[yare::parameterized(
    v1               = { &["cohortextractor:latest".to_string(), "generate_cohort".to_string()], Some(1) },
    v1_other_subcommand = { &["cohortextractor:latest".to_string(), "dump_study".to_string()], None },
    v1_no_subcommand = { &["cohortextractor:latest".to_string()], None },
    v2_databuilder   = { &["databuilder:v2".to_string()], Some(2) },
    v2_ehrql         = { &["ehrql:v1".to_string(), "generate-dataset".to_string()], Some(2) },
    plain            = { &["python:latest".to_string(), "python".to_string()], None },
    empty            = { &[], None },
)]
fn extraction_detection(parts: &[String], expected: Option<u8>) {
    assert_eq!(extraction_command_version(parts), expected);
    assert_eq!(is_extraction_command(parts), expected.is_some());
}

#[test]
fn quoting_survives_spaced_arguments() {
    let pipeline = pipeline(
        r#"
version: 1
actions:
  analyse:
    run: "python:latest python analyse.py --title 'two words'"
    outputs: {moderately_sensitive: {report: out/report.txt}}
"#,
    );
    let spec = get_action_specification(&pipeline, "analyse", false).unwrap();
    let parts = shlex::split(&spec.run).unwrap();
    assert_eq!(parts.last().unwrap(), "two words");
}
