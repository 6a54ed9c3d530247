// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run loop: one cooperative tick at a time.

use fm_core::{Clock, State, FLAG_LAST_SEEN_AT, FLAG_MANUAL_DB_MAINTENANCE, FLAG_MODE, FLAG_PAUSED};
use fm_executors::ExecutorApi;
use fm_storage::{Database, StorageError};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::spans;

/// Scheduling flags read once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickFlags {
    pub paused: bool,
    pub db_maintenance: bool,
}

/// The controller engine: owns the state machine and the run loop.
pub struct Engine<E: ExecutorApi, C: Clock> {
    pub(crate) db: Database,
    pub(crate) executor: E,
    pub(crate) config: EngineConfig,
    pub(crate) clock: C,
    /// Consecutive transient executor failures per job id
    pub(crate) retries: Mutex<HashMap<String, u32>>,
}

impl<E: ExecutorApi, C: Clock> Engine<E, C> {
    pub fn new(db: Database, executor: E, config: EngineConfig, clock: C) -> Self {
        Self { db, executor, config, clock, retries: Mutex::new(HashMap::new()) }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run ticks until cancelled. Tick-level errors are logged and retried
    /// after a back-off; they never crash the process.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(backend = %self.config.backend, "run loop started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let delay = match self.tick(&shutdown).await {
                Ok(()) => self.config.job_loop_interval,
                Err(e) => {
                    tracing::error!(error = %e, "run loop tick failed");
                    self.config.poll_interval * 5
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(backend = %self.config.backend, "run loop stopped");
    }

    /// One scheduling pass over the active jobs, FIFO by `created_at`.
    pub async fn tick(&self, shutdown: &CancellationToken) -> Result<(), StorageError> {
        let tick_start = self.clock.epoch_ns();
        let now = self.clock.epoch_secs();
        self.db.set_flag(
            FLAG_LAST_SEEN_AT,
            Some(&fm_core::timestamp_to_isoformat(now)),
            &self.config.backend,
            now,
        )?;

        let flags = self.read_flags()?;
        let jobs = self.db.active_jobs_for_backend(&self.config.backend)?;
        let job_count = jobs.len();

        // A just-started job counts against the budget for the rest of the
        // tick, so track the running cost locally and recount per
        // transition
        let mut running_cost: f64 = jobs
            .iter()
            .filter(|job| job.state == State::Running)
            .map(|job| self.config.weight(&job.action))
            .sum();

        for mut job in jobs {
            // The stop latch is checked between jobs; in-flight work is
            // left untouched
            if shutdown.is_cancelled() {
                break;
            }
            let span = tracing::info_span!(
                "job",
                job_id = %job.id,
                action = %job.action,
                workspace = %job.workspace
            );
            let _enter = span.enter();

            let handled = std::panic::AssertUnwindSafe(self.handle_job(
                &mut job,
                &flags,
                &mut running_cost,
            ))
            .catch_unwind()
            .await;
            match handled {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    // A bug in handling one job must not take out the rest
                    // of the fleet
                    tracing::error!(job_id = %job.id, "panic while handling job");
                    self.force_fail(&mut job, "Internal error")?;
                }
            }
        }

        spans::record_tick_span(&self.config.backend, job_count, tick_start, self.clock.epoch_ns());
        Ok(())
    }

    pub(crate) fn read_flags(&self) -> Result<TickFlags, StorageError> {
        let backend = &self.config.backend;
        let paused =
            self.db.flag_value(FLAG_PAUSED, backend, None)?.as_deref() == Some("true");
        let mode = self.db.flag_value(FLAG_MODE, backend, None)?;
        let manual = self.db.flag_value(FLAG_MANUAL_DB_MAINTENANCE, backend, None)?;
        let db_maintenance =
            mode.as_deref() == Some("db-maintenance") || manual.as_deref() == Some("on");
        Ok(TickFlags { paused, db_maintenance })
    }
}

#[cfg(test)]
#[path = "run_loop_tests.rs"]
mod run_loop_tests;
