// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend-scoped key/value flags gating the scheduler.

use serde::{Deserialize, Serialize};

/// Pause intake of new work: `"true"` or unset.
pub const FLAG_PAUSED: &str = "paused";
/// Current backend mode: `"db-maintenance"` or unset.
pub const FLAG_MODE: &str = "mode";
/// Operator-forced maintenance: `"on"` or unset.
pub const FLAG_MANUAL_DB_MAINTENANCE: &str = "manual-db-maintenance";
/// Run-loop heartbeat, written once per tick.
pub const FLAG_LAST_SEEN_AT: &str = "last-seen-at";

/// One `(id, backend)` flag row. `timestamp` records the last time the
/// *value* changed, not the last write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub id: String,
    pub value: Option<String>,
    pub backend: String,
    pub timestamp: Option<i64>,
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.value.as_deref().unwrap_or("None");
        match self.timestamp {
            Some(ts) => write!(f, "{}={} ({})", self.id, value, crate::timestamp_to_isoformat(ts)),
            None => write!(f, "{}={} (never set)", self.id, value),
        }
    }
}
