// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const VALID_PROJECT: &str = r#"
version: "3.0"
expectations:
  population_size: 1000
actions:
  generate_dataset:
    run: ehrql:v1 generate-dataset dataset.py --output=output/dataset.csv --dummy-data-file=dummy.csv
    outputs:
      highly_sensitive:
        dataset: output/dataset.csv
  analyse:
    run: python:latest python analyse.py
    needs: [generate_dataset]
    outputs:
      moderately_sensitive:
        report: output/report.txt
"#;

#[test]
fn parses_a_valid_project() {
    let pipeline = parse_and_validate_project_file(VALID_PROJECT.as_bytes()).unwrap();
    assert_eq!(pipeline.version, 3.0);
    assert_eq!(pipeline.population_size, 1000);
    assert_eq!(pipeline.all_actions(), ["generate_dataset", "analyse"]);

    let analyse = pipeline.action("analyse").unwrap();
    assert_eq!(analyse.run[0], "python:latest");
    assert_eq!(analyse.needs, ["generate_dataset"]);
}

#[test]
fn preserves_action_order() {
    let yaml = r#"
version: 1
actions:
  zebra:
    run: python:latest python z.py
    outputs: {moderately_sensitive: {z: out/z.txt}}
  aardvark:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
"#;
    let pipeline = parse_and_validate_project_file(yaml.as_bytes()).unwrap();
    assert_eq!(pipeline.all_actions(), ["zebra", "aardvark"]);
}

#[test]
fn run_all_is_never_a_real_action() {
    let yaml = r#"
version: 1
actions:
  run_all:
    run: python:latest python all.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
  real:
    run: python:latest python real.py
    outputs: {moderately_sensitive: {b: out/b.txt}}
"#;
    let pipeline = parse_and_validate_project_file(yaml.as_bytes()).unwrap();
    assert_eq!(pipeline.all_actions(), ["real"]);
}

#[test]
fn missing_version_is_rejected() {
    let yaml = r#"
actions:
  a:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::MissingVersion));
}

#[yare::parameterized(
    not_a_number = { "version: fork" },
    too_big      = { "version: 9" },
    zero         = { "version: 0" },
)]
fn bad_versions_are_rejected(version_line: &str) {
    let yaml = format!(
        "{}\nactions:\n  a:\n    run: python:latest python a.py\n    outputs: {{moderately_sensitive: {{a: out/a.txt}}}}\n",
        version_line
    );
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::InvalidVersion));
}

#[test]
fn version_3_requires_expectations() {
    let yaml = r#"
version: 3
actions:
  a:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::MissingExpectations));
}

#[test]
fn version_1_defaults_population_size() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
"#;
    let pipeline = parse_and_validate_project_file(yaml.as_bytes()).unwrap();
    assert_eq!(pipeline.population_size, 1000);
}

#[test]
fn unversioned_image_is_rejected() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python python a.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::UnversionedImage { .. }));
}

#[test]
fn unknown_needs_is_rejected() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python:latest python a.py
    needs: [nonexistent]
    outputs: {moderately_sensitive: {a: out/a.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::UnknownDependency { .. }));
}

#[test]
fn space_separated_needs_get_a_helpful_error() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
  b:
    run: python:latest python b.py
    needs: ["a c"]
    outputs: {moderately_sensitive: {b: out/b.txt}}
  c:
    run: python:latest python c.py
    outputs: {moderately_sensitive: {c: out/c.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("separated with commas"));
}

#[test]
fn duplicate_run_commands_are_rejected() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python:latest python same.py
    outputs: {moderately_sensitive: {a: out/a.txt}}
  b:
    run: python:latest python same.py
    outputs: {moderately_sensitive: {b: out/b.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::DuplicateRunCommand { .. }));
}

#[test]
fn duplicate_output_paths_rejected_from_version_2() {
    let yaml = r#"
version: 2
actions:
  a:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/same.txt}}
  b:
    run: python:latest python b.py
    outputs: {moderately_sensitive: {b: out/same.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::DuplicateOutputPattern { .. }));
}

#[test]
fn duplicate_output_paths_allowed_in_version_1() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python:latest python a.py
    outputs: {moderately_sensitive: {a: out/same.txt}}
  b:
    run: python:latest python b.py
    outputs: {moderately_sensitive: {b: out/same.txt}}
"#;
    parse_and_validate_project_file(yaml.as_bytes()).unwrap();
}

#[test]
fn invalid_privacy_level_is_rejected() {
    let yaml = r#"
version: 1
actions:
  a:
    run: python:latest python a.py
    outputs: {top_secret: {a: out/a.txt}}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::InvalidPrivacyLevel { .. }));
}

#[test]
fn extraction_action_must_have_single_output_group() {
    let yaml = r#"
version: 1
actions:
  generate:
    run: cohortextractor:latest generate_cohort
    outputs:
      highly_sensitive: {cohort: output/input.csv}
      moderately_sensitive: {log: output/log.txt}
"#;
    let err = parse_and_validate_project_file(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::ExtractionOutputCount { count: 2, .. }));
}

#[yare::parameterized(
    plain          = { "python:latest", "python", "latest" },
    with_registry  = { "ghcr.io/opensafely-core/python:latest", "python", "latest" },
    no_tag         = { "python", "python", "" },
)]
fn image_reference_splitting(image: &str, name: &str, tag: &str) {
    let (got_name, _, got_tag) = split_image_reference(image);
    assert_eq!(got_name, name);
    assert_eq!(got_tag, tag);
}

#[test]
fn unknown_action_lookup_fails() {
    let pipeline = parse_and_validate_project_file(VALID_PROJECT.as_bytes()).unwrap();
    assert!(matches!(
        pipeline.action("missing"),
        Err(ProjectError::UnknownAction { .. })
    ));
}
