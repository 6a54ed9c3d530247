// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{test_context, BACKEND};
use fm_core::{FLAG_MANUAL_DB_MAINTENANCE, FLAG_MODE, FLAG_PAUSED};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn tick_updates_the_heartbeat_flag() {
    let ctx = test_context();
    ctx.engine.tick(&CancellationToken::new()).await.unwrap();

    let flag = ctx.db.get_flag(FLAG_LAST_SEEN_AT, BACKEND).unwrap().unwrap();
    assert!(flag.value.unwrap().starts_with("20"));
}

#[tokio::test]
async fn flags_default_to_open() {
    let ctx = test_context();
    let flags = ctx.engine.read_flags().unwrap();
    assert!(!flags.paused);
    assert!(!flags.db_maintenance);
}

#[tokio::test]
async fn maintenance_mode_from_either_flag() {
    let ctx = test_context();

    ctx.db.set_flag(FLAG_MODE, Some("db-maintenance"), BACKEND, 1).unwrap();
    assert!(ctx.engine.read_flags().unwrap().db_maintenance);

    ctx.db.set_flag(FLAG_MODE, None, BACKEND, 2).unwrap();
    assert!(!ctx.engine.read_flags().unwrap().db_maintenance);

    ctx.db.set_flag(FLAG_MANUAL_DB_MAINTENANCE, Some("on"), BACKEND, 3).unwrap();
    assert!(ctx.engine.read_flags().unwrap().db_maintenance);
}

#[tokio::test]
async fn paused_flag_must_be_exactly_true() {
    let ctx = test_context();
    ctx.db.set_flag(FLAG_PAUSED, Some("yes"), BACKEND, 1).unwrap();
    assert!(!ctx.engine.read_flags().unwrap().paused);

    ctx.db.set_flag(FLAG_PAUSED, Some("true"), BACKEND, 2).unwrap();
    assert!(ctx.engine.read_flags().unwrap().paused);
}

#[tokio::test]
async fn cancelled_token_stops_job_handling_between_jobs() {
    let ctx = test_context();
    let job = ctx.insert_pending_job("analyse");

    let token = CancellationToken::new();
    token.cancel();
    ctx.engine.tick(&token).await.unwrap();

    // Nothing was touched: the latch is checked before each job
    assert_eq!(ctx.status_of(&job.id), fm_core::StatusCode::Created);
}

#[tokio::test]
async fn other_backends_jobs_are_ignored() {
    let ctx = test_context();
    let foreign = fm_core::Job::builder().backend("other-backend").action("a").build();
    ctx.db.insert_job(&foreign).unwrap();

    ctx.tick().await;
    assert_eq!(ctx.status_of(&foreign.id), fm_core::StatusCode::Created);
}
