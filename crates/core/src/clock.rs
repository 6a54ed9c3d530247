// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! Job rows store coarse timestamps in whole seconds (`created_at`,
//! `started_at`, ...) and the fine-grained `status_code_updated_at` in
//! nanoseconds, so the trait exposes both resolutions.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Whole seconds since the UNIX epoch.
    fn epoch_secs(&self) -> i64;
    /// Nanoseconds since the UNIX epoch.
    fn epoch_ns(&self) -> i64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn epoch_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    epoch_ns: Arc<Mutex<i64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        // Arbitrary non-zero start so timestamps are visibly fake in fixtures
        Self { epoch_ns: Arc::new(Mutex::new(1_000_000_000_000_000_000)) }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.epoch_ns.lock() += duration.as_nanos() as i64;
    }

    /// Set the clock to a specific number of whole seconds since the epoch
    pub fn set_epoch_secs(&self, secs: i64) {
        *self.epoch_ns.lock() = secs * 1_000_000_000;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_secs(&self) -> i64 {
        *self.epoch_ns.lock() / 1_000_000_000
    }

    fn epoch_ns(&self) -> i64 {
        *self.epoch_ns.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod clock_tests;
