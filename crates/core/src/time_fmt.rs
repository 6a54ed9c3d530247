// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UNIX-timestamp ↔ ISO-8601 conversion for the coordination-server wire
//! format.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format whole seconds since the epoch as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn timestamp_to_isoformat(ts: i64) -> String {
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => String::new(),
    }
}

/// Parse an ISO-8601 string back to whole seconds. Returns `None` for
/// unparseable input.
pub fn timestamp_from_isoformat(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp())
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod time_fmt_tests;
