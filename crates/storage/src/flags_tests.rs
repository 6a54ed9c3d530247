// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::Database;
use fm_core::FLAG_PAUSED;

#[test]
fn get_unset_flag_is_none() {
    let db = Database::in_memory().unwrap();
    assert!(db.get_flag(FLAG_PAUSED, "tpp").unwrap().is_none());
    assert_eq!(
        db.flag_value(FLAG_PAUSED, "tpp", Some("false")).unwrap().as_deref(),
        Some("false")
    );
}

#[test]
fn set_then_get() {
    let db = Database::in_memory().unwrap();
    db.set_flag(FLAG_PAUSED, Some("true"), "tpp", 100).unwrap();

    let flag = db.get_flag(FLAG_PAUSED, "tpp").unwrap().unwrap();
    assert_eq!(flag.value.as_deref(), Some("true"));
    assert_eq!(flag.timestamp, Some(100));
}

#[test]
fn set_same_value_preserves_timestamp() {
    let db = Database::in_memory().unwrap();
    db.set_flag(FLAG_PAUSED, Some("true"), "tpp", 100).unwrap();
    db.set_flag(FLAG_PAUSED, Some("true"), "tpp", 999).unwrap();

    let flag = db.get_flag(FLAG_PAUSED, "tpp").unwrap().unwrap();
    assert_eq!(flag.timestamp, Some(100));
}

#[test]
fn set_new_value_updates_timestamp() {
    let db = Database::in_memory().unwrap();
    db.set_flag(FLAG_PAUSED, Some("true"), "tpp", 100).unwrap();
    db.set_flag(FLAG_PAUSED, None, "tpp", 200).unwrap();

    let flag = db.get_flag(FLAG_PAUSED, "tpp").unwrap().unwrap();
    assert_eq!(flag.value, None);
    assert_eq!(flag.timestamp, Some(200));
}

#[test]
fn flags_are_backend_scoped() {
    let db = Database::in_memory().unwrap();
    db.set_flag(FLAG_PAUSED, Some("true"), "tpp", 100).unwrap();

    assert!(db.get_flag(FLAG_PAUSED, "emis").unwrap().is_none());
    db.set_flag("mode", Some("db-maintenance"), "tpp", 150).unwrap();

    let flags = db.flags_for_backend("tpp").unwrap();
    let ids: Vec<_> = flags.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["mode", "paused"]);
}
