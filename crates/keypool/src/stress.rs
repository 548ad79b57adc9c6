// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrent acquire/hold/release load against one provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Barrier;
use tokio::time::Instant;

use crate::error::PoolError;
use crate::lease::{AcquireRequest, FinalState, Requester, WaitOptions};
use crate::manager::LeaseManager;

/// Shape of a stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressPlan {
    pub provider: String,
    pub workers: usize,
    /// Each worker holds its lease for a random time in this range.
    pub hold_min: Duration,
    pub hold_max: Duration,
    pub wait: WaitOptions,
    pub tenant: String,
}

impl StressPlan {
    pub fn new(provider: impl Into<String>, workers: usize) -> Self {
        Self {
            provider: provider.into(),
            workers,
            hold_min: Duration::from_millis(50),
            hold_max: Duration::from_millis(200),
            wait: WaitOptions::default(),
            tenant: String::new(),
        }
    }
}

/// Outcome counts and acquire latency percentiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressReport {
    pub workers: usize,
    pub granted: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    /// Grants per credential name.
    pub per_key: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

enum Outcome {
    Granted { key: String, waited: Duration },
    TimedOut,
    Failed,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[u64], pct: u64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len() as u64).div_ceil(100).max(1) as usize;
    sorted[rank.min(sorted.len()) - 1]
}

/// Start every worker at once and wait for all of them.
pub async fn run(manager: &LeaseManager, plan: &StressPlan) -> StressReport {
    let started = Instant::now();
    let gate = Arc::new(Barrier::new(plan.workers.max(1)));
    let run_id = uuid::Uuid::new_v4().simple().to_string();

    let mut handles = Vec::with_capacity(plan.workers);
    for i in 0..plan.workers {
        let manager = manager.clone();
        let plan = plan.clone();
        let gate = Arc::clone(&gate);
        let request_id = format!("stress-{run_id}-{i}");
        handles.push(tokio::spawn(async move { worker(manager, plan, gate, request_id, i).await }));
    }

    let mut report = StressReport { workers: plan.workers, ..StressReport::default() };
    let mut latencies = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Outcome::Granted { key, waited }) => {
                report.granted += 1;
                *report.per_key.entry(key).or_default() += 1;
                latencies.push(millis(waited));
            }
            Ok(Outcome::TimedOut) => report.timed_out += 1,
            Ok(Outcome::Failed) | Err(_) => report.failed += 1,
        }
    }
    latencies.sort_unstable();
    report.p50_ms = percentile(&latencies, 50);
    report.p95_ms = percentile(&latencies, 95);
    report.max_ms = latencies.last().copied().unwrap_or(0);
    report.elapsed_ms = millis(started.elapsed());
    tracing::info!(
        workers = report.workers,
        granted = report.granted,
        timed_out = report.timed_out,
        failed = report.failed,
        p95_ms = report.p95_ms,
        "stress: complete"
    );
    report
}

async fn worker(
    manager: LeaseManager,
    plan: StressPlan,
    gate: Arc<Barrier>,
    request_id: String,
    index: usize,
) -> Outcome {
    let hold = {
        let lo = millis(plan.hold_min);
        let hi = millis(plan.hold_max).max(lo);
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    };
    let req = AcquireRequest::new(&plan.provider, request_id).requester(Requester::new(
        format!("stress-{index}"),
        "stress",
        plan.tenant.clone(),
    ));

    gate.wait().await;
    let started = Instant::now();
    let lease = match manager.acquire(&req, &plan.wait, None).await {
        Ok(lease) => lease,
        Err(PoolError::Timeout { .. } | PoolError::Unavailable { .. }) => return Outcome::TimedOut,
        Err(e) => {
            tracing::warn!(request_id = %req.request_id, err = %e, "stress: acquire failed");
            return Outcome::Failed;
        }
    };
    let waited = started.elapsed();
    tokio::time::sleep(hold).await;
    if let Err(e) = manager.release(&lease.lease_id, FinalState::Released).await {
        tracing::warn!(lease_id = %lease.lease_id, err = %e, "stress: release failed");
    }
    Outcome::Granted { key: lease.key_name, waited }
}

#[cfg(test)]
#[path = "stress_tests.rs"]
mod tests;
