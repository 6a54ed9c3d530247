// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::strategies::arb_status_code;
use proptest::prelude::*;

#[test]
fn builder_derives_deterministic_id() {
    let job = Job::builder().job_request_id("r1").action("a").build();
    assert_eq!(job.id, "426yksbqdezselcm");

    let again = Job::builder().job_request_id("r1").action("a").build();
    assert_eq!(job.id, again.id);
}

#[test]
fn explicit_id_wins() {
    let job = Job::builder().id("fixed").build();
    assert_eq!(job.id, "fixed");
}

#[yare::parameterized(
    pending   = { State::Pending, false },
    running   = { State::Running, false },
    failed    = { State::Failed, true },
    succeeded = { State::Succeeded, true },
)]
fn terminal_states(state: State, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}

#[test]
fn state_wire_format() {
    assert_eq!(State::Pending.to_string(), "pending");
    assert_eq!(serde_json::to_string(&State::Succeeded).unwrap(), "\"succeeded\"");
}

#[yare::parameterized(
    created       = { StatusCode::Created, State::Pending },
    waiting_deps  = { StatusCode::WaitingOnDependencies, State::Pending },
    preparing     = { StatusCode::Preparing, State::Running },
    finalized     = { StatusCode::Finalized, State::Running },
    succeeded     = { StatusCode::Succeeded, State::Succeeded },
    nonzero_exit  = { StatusCode::NonzeroExit, State::Failed },
    killed        = { StatusCode::KilledByAdmin, State::Failed },
)]
fn status_code_states(code: StatusCode, state: State) {
    assert_eq!(code.state(), state);
}

#[test]
fn display_matches_serde_form() {
    let code = StatusCode::WaitingDbMaintenance;
    let json = serde_json::to_string(&code).unwrap();
    assert_eq!(json, format!("\"{}\"", code));
}

#[test]
fn running_codes_map_onto_executor_states() {
    assert_eq!(StatusCode::Executing.executor_state(), Some(ExecutorState::Executing));
    assert_eq!(StatusCode::Created.executor_state(), None);
    assert_eq!(StatusCode::Succeeded.executor_state(), None);
}

#[test]
fn active_iff_not_terminal() {
    assert!(Job::builder().status(StatusCode::Created).build().is_active());
    assert!(Job::builder().status(StatusCode::Executing).build().is_active());
    assert!(!Job::builder().status(StatusCode::Succeeded).build().is_active());
    assert!(!Job::builder().status(StatusCode::DependencyFailed).build().is_active());
}

proptest! {
    #[test]
    fn failure_codes_are_exactly_the_failed_state(code in arb_status_code()) {
        prop_assert_eq!(code.is_failure(), code.state() == State::Failed);
    }

    #[test]
    fn executor_state_only_for_running_codes(code in arb_status_code()) {
        prop_assert_eq!(code.executor_state().is_some(), code.state() == State::Running);
    }
}
