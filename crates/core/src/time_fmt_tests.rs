// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn formats_epoch() {
    assert_eq!(timestamp_to_isoformat(0), "1970-01-01T00:00:00Z");
    assert_eq!(timestamp_to_isoformat(1_600_000_000), "2020-09-13T12:26:40Z");
}

#[test]
fn parses_what_it_formats() {
    assert_eq!(timestamp_from_isoformat("2020-09-13T12:26:40Z"), Some(1_600_000_000));
    assert_eq!(timestamp_from_isoformat("not a timestamp"), None);
}

proptest! {
    #[test]
    fn round_trip(ts in 0i64..4_000_000_000) {
        prop_assert_eq!(timestamp_from_isoformat(&timestamp_to_isoformat(ts)), Some(ts));
    }
}
