// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::catalog::Catalog;
use crate::clock::epoch_ms;
use crate::lease::{LeaseState, Requester, WaitOptions, WaiterState};
use crate::test_support::{key, request, TestPool};

#[tokio::test]
async fn sweep_reports_each_step() -> anyhow::Result<()> {
    let pool = TestPool::seeded(&Catalog::new().with("p", key("k1", 1))).await?;
    let m = &pool.manager;
    m.acquire(&request("p", "r1"), &WaitOptions::no_wait(), None).await?;
    let enqueued = epoch_ms(m.now());
    m.store().write(|tx| {
        queue::ensure_ticket(tx, "p", "ghost", &Requester::default(), enqueued).map(|_| ())
    })?;

    pool.advance(Duration::from_secs(7 * 3600));
    let report = m.sweep(None).await;
    assert_eq!(
        report,
        SweepReport {
            expired_leases: 1,
            trimmed_buckets: 1,
            expired_waiters: 1,
            purged_waiters: 0,
            failures: vec![],
        }
    );
    let waiters = m.list_waiters(10).await?;
    assert_eq!(waiters.len(), 1);
    assert_ne!(waiters[0].state, WaiterState::Waiting);

    pool.advance(Duration::from_secs(31 * 60));
    let report = m.sweep(None).await;
    assert_eq!(report.purged_waiters, 1);
    assert_eq!(report.expired_leases, 0);
    assert!(m.list_waiters(10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_step_does_not_stop_the_sweep() -> anyhow::Result<()> {
    let pool = TestPool::seeded(&Catalog::new().with("p", key("k1", 1))).await?;
    let m = &pool.manager;
    m.acquire(&request("p", "r1"), &WaitOptions::no_wait(), None).await?;
    m.store().write(|tx| {
        tx.execute_batch("DROP TABLE usage_minute")?;
        Ok(())
    })?;

    pool.advance(Duration::from_secs(600));
    let report = m.sweep(None).await;
    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "trim_usage");
    assert!(report.failures[0].error.contains("usage_minute"));
    assert_eq!(report.expired_leases, 1);
    Ok(())
}

#[tokio::test]
async fn sweeper_runs_until_cancelled() -> anyhow::Result<()> {
    let pool = TestPool::seeded(&Catalog::new().with("p", key("k1", 1))).await?;
    let m = &pool.manager;
    let req = request("p", "r1").lease_ttl(Duration::from_secs(1));
    let lease = m.acquire(&req, &WaitOptions::no_wait(), None).await?;
    pool.advance(Duration::from_secs(5));

    let shutdown = CancellationToken::new();
    let handle = spawn_sweeper(m.clone(), Duration::from_millis(10), shutdown.clone());

    let mut state = None;
    for _ in 0..200 {
        state = m.get_lease(&lease.lease_id).await?.map(|l| l.state);
        if state == Some(LeaseState::Expired) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, Some(LeaseState::Expired));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await??;
    Ok(())
}
