// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fm_core::test_support::{job_definition, output_spec};

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn list_files_is_relative_recursive_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "output/b.csv", "b");
    write(dir.path(), "output/sub/a.csv", "a");
    write(dir.path(), "analysis.py", "print()");
    write(dir.path(), ".foreman/results.json", "{}");
    write(dir.path(), ".git/HEAD", "ref");

    let files = list_files(dir.path()).unwrap();
    assert_eq!(files, ["analysis.py", "output/b.csv", "output/sub/a.csv"]);
}

#[test]
fn match_outputs_classifies_by_privacy() {
    let mut definition = job_definition("job1", "generate");
    definition.output_spec = output_spec("highly_sensitive", "data", "output/*.csv");
    definition
        .output_spec
        .insert("moderately_sensitive".to_string(), {
            let mut group = indexmap::IndexMap::new();
            group.insert("log".to_string(), "logs/*.txt".to_string());
            group
        });

    let produced = vec![
        "output/a.csv".to_string(),
        "output/b.csv".to_string(),
        "logs/run.txt".to_string(),
    ];
    let matches = match_outputs(&definition, &produced);

    assert_eq!(matches.outputs.get("output/a.csv").unwrap(), "highly_sensitive");
    assert_eq!(matches.outputs.get("output/b.csv").unwrap(), "highly_sensitive");
    assert_eq!(matches.outputs.get("logs/run.txt").unwrap(), "moderately_sensitive");
    assert!(matches.unmatched_patterns.is_empty());
    assert!(matches.unmatched_outputs.is_empty());
}

#[test]
fn unmatched_patterns_collect_leftover_files() {
    let mut definition = job_definition("job1", "generate");
    definition.output_spec = output_spec("highly_sensitive", "data", "output/*.csv");

    let produced = vec!["output/x.log".to_string()];
    let matches = match_outputs(&definition, &produced);

    assert_eq!(matches.unmatched_patterns, ["output/*.csv"]);
    assert_eq!(matches.unmatched_outputs, ["output/x.log"]);
    assert!(matches.outputs.is_empty());
}

#[test]
fn unmatched_outputs_only_populated_when_patterns_unmatched() {
    let mut definition = job_definition("job1", "generate");
    definition.output_spec = output_spec("highly_sensitive", "data", "output/*.csv");

    // Stray file alongside a matched one: patterns all matched, so no
    // unmatched_outputs are reported
    let produced = vec!["output/a.csv".to_string(), "scratch.txt".to_string()];
    let matches = match_outputs(&definition, &produced);
    assert!(matches.unmatched_patterns.is_empty());
    assert!(matches.unmatched_outputs.is_empty());
    assert_eq!(matches.outputs.len(), 1);
}

#[test]
fn publish_outputs_separates_privacy_levels() {
    let volume = tempfile::tempdir().unwrap();
    let high = tempfile::tempdir().unwrap();
    let medium = tempfile::tempdir().unwrap();
    write(volume.path(), "output/data.csv", "secret");
    write(volume.path(), "output/counts.csv", "aggregated");

    let mut outputs = BTreeMap::new();
    outputs.insert("output/data.csv".to_string(), "highly_sensitive".to_string());
    outputs.insert("output/counts.csv".to_string(), "moderately_sensitive".to_string());

    publish_outputs(volume.path(), high.path(), medium.path(), &outputs).unwrap();

    assert!(high.path().join("output/data.csv").exists());
    assert!(!high.path().join("output/counts.csv").exists());
    assert!(medium.path().join("output/counts.csv").exists());
    assert!(!medium.path().join("output/data.csv").exists());
}

#[test]
fn results_round_trip_on_disk() {
    let volume = tempfile::tempdir().unwrap();
    assert!(read_results(volume.path()).unwrap().is_none());

    let results = JobResults {
        exit_code: 3,
        image_id: "sha256:abc".to_string(),
        unmatched_patterns: vec!["output/*.csv".to_string()],
        ..JobResults::default()
    };
    write_results(volume.path(), &results).unwrap();
    assert_eq!(read_results(volume.path()).unwrap().unwrap(), results);
}

#[test]
fn initial_manifest_round_trip() {
    let volume = tempfile::tempdir().unwrap();
    assert!(read_initial_manifest(volume.path()).unwrap().is_empty());

    write_initial_manifest(volume.path(), vec!["analysis.py".to_string()]).unwrap();
    assert_eq!(read_initial_manifest(volume.path()).unwrap(), ["analysis.py"]);
}
