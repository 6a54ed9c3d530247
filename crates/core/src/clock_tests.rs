// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_resolutions_agree() {
    let clock = SystemClock;
    let secs = clock.epoch_secs();
    let ns = clock.epoch_ns();
    // ns reading taken after secs, so it can only be equal or later
    assert!(ns / 1_000_000_000 >= secs);
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let before = clock.epoch_ns();
    clock.advance(Duration::from_secs(90));
    assert_eq!(clock.epoch_ns() - before, 90_000_000_000);
    assert_eq!(clock.epoch_secs() - before / 1_000_000_000, 90);
}

#[test]
fn fake_clock_set_epoch_secs() {
    let clock = FakeClock::new();
    clock.set_epoch_secs(1_600_000_000);
    assert_eq!(clock.epoch_secs(), 1_600_000_000);
    assert_eq!(clock.epoch_ns(), 1_600_000_000 * 1_000_000_000);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.epoch_ns(), other.epoch_ns());
}
