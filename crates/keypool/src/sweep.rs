// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance sweep: stale leases, old usage buckets, abandoned tickets.
//!
//! Each step commits on its own. A failing step is recorded and logged and
//! the remaining steps still run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{duration_ms, epoch_ms, minute_bucket};
use crate::error::PoolError;
use crate::lease;
use crate::manager::LeaseManager;
use crate::queue;
use crate::usage;

/// Retention windows applied by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    pub usage_retention: Duration,
    pub waiter_abandon: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            usage_retention: Duration::from_secs(30 * 60),
            waiter_abandon: Duration::from_secs(6 * 3600),
        }
    }
}

/// A sweep step that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub step: String,
    pub error: String,
}

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired_leases: usize,
    pub trimmed_buckets: usize,
    pub expired_waiters: usize,
    pub purged_waiters: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: &str, result: Result<usize, PoolError>) -> usize {
        match result {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(step, err = %e, "sweep: step failed");
                self.failures.push(SweepFailure { step: step.to_owned(), error: e.to_string() });
                0
            }
        }
    }
}

impl LeaseManager {
    /// Run one maintenance pass. Never fails as a whole; see [`SweepReport::failures`].
    ///
    /// `stale_after` overrides each lease's own TTL when given.
    pub async fn sweep(&self, stale_after: Option<Duration>) -> SweepReport {
        let now = self.now();
        let now_ms = epoch_ms(now);
        let policy = self.settings().sweep;
        let stale_ms = stale_after.map(duration_ms);
        let retention_ms = duration_ms(policy.usage_retention);
        let bucket_cutoff = minute_bucket(now).saturating_sub(retention_ms);
        let ticket_cutoff = now_ms.saturating_sub(duration_ms(policy.waiter_abandon));
        let purge_cutoff = now_ms.saturating_sub(retention_ms);

        let mut report = SweepReport::default();

        let result = self
            .store()
            .blocking(move |s| s.write(|tx| lease::reclaim_stale(tx, now_ms, stale_ms)))
            .await;
        report.expired_leases = report.record("expire_leases", result);

        let result =
            self.store().blocking(move |s| s.write(|tx| usage::trim(tx, bucket_cutoff))).await;
        report.trimmed_buckets = report.record("trim_usage", result);

        let result = self
            .store()
            .blocking(move |s| s.write(|tx| queue::expire_abandoned(tx, ticket_cutoff, now_ms)))
            .await;
        report.expired_waiters = report.record("expire_waiters", result);

        let result = self
            .store()
            .blocking(move |s| s.write(|tx| queue::purge_finished(tx, purge_cutoff)))
            .await;
        report.purged_waiters = report.record("purge_waiters", result);

        if report.expired_leases > 0 || report.expired_waiters > 0 {
            self.wake_waiters();
        }
        tracing::debug!(
            expired_leases = report.expired_leases,
            trimmed_buckets = report.trimmed_buckets,
            expired_waiters = report.expired_waiters,
            purged_waiters = report.purged_waiters,
            failures = report.failures.len(),
            "sweep: complete"
        );
        report
    }
}

/// Sweep every `interval` until `shutdown` fires.
pub fn spawn_sweeper(
    manager: LeaseManager,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = manager.sweep(None).await;
                    if report.expired_leases > 0 || report.expired_waiters > 0 {
                        tracing::info!(
                            expired_leases = report.expired_leases,
                            expired_waiters = report.expired_waiters,
                            "sweeper: reclaimed"
                        );
                    }
                }
            }
        }
        tracing::debug!("sweeper: stopped");
    })
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
