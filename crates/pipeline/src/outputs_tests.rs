// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fm_core::test_support::output_spec;

#[yare::parameterized(
    plain_file     = { "output/dataset.csv" },
    wildcard       = { "output/*.csv" },
    top_level      = { "report.html" },
    nested         = { "output/figures/fig1.png" },
)]
fn valid_patterns(pattern: &str) {
    assert_valid_glob_pattern(pattern).unwrap();
}

#[yare::parameterized(
    back_slashes    = { "output\\dataset.csv", InvalidPatternError::BackSlashes },
    double_star     = { "output/**/*.csv", InvalidPatternError::UnsupportedWildcard("**".to_string()) },
    question_mark   = { "output/?.csv", InvalidPatternError::UnsupportedWildcard("?".to_string()) },
    char_class      = { "output/[ab].csv", InvalidPatternError::UnsupportedWildcard("[".to_string()) },
    trailing_slash  = { "output/", InvalidPatternError::TrailingSlash },
    double_slash    = { "output//dataset.csv", InvalidPatternError::NotNormalised },
    parent_dir      = { "output/../secrets.csv", InvalidPatternError::NotNormalised },
    current_dir     = { "./output/dataset.csv", InvalidPatternError::NotNormalised },
    metadata        = { "metadata/log.txt", InvalidPatternError::MetadataDirectory },
    metadata_exact  = { "metadata", InvalidPatternError::MetadataDirectory },
    absolute_posix  = { "/etc/passwd", InvalidPatternError::Absolute },
    absolute_windows = { "c:/secrets.csv", InvalidPatternError::Absolute },
)]
fn invalid_patterns(pattern: &str, expected: InvalidPatternError) {
    assert_eq!(assert_valid_glob_pattern(pattern).unwrap_err(), expected);
}

#[test]
fn output_dirs_deduplicate() {
    let mut spec = output_spec("highly_sensitive", "a", "output/a.csv");
    spec.get_mut("highly_sensitive")
        .unwrap()
        .insert("b".to_string(), "output/b.csv".to_string());
    assert_eq!(get_output_dirs(&spec), ["output"]);
}

#[test]
fn output_dirs_preserve_first_seen_order() {
    let mut spec = output_spec("highly_sensitive", "a", "first/a.csv");
    spec.insert("moderately_sensitive".to_string(), {
        let mut group = indexmap::IndexMap::new();
        group.insert("b".to_string(), "second/b.csv".to_string());
        group.insert("c".to_string(), "first/c.csv".to_string());
        group
    });
    assert_eq!(get_output_dirs(&spec), ["first", "second"]);
}

#[test]
fn top_level_outputs_map_to_dot() {
    let spec = output_spec("moderately_sensitive", "report", "report.html");
    assert_eq!(get_output_dirs(&spec), ["."]);
}
