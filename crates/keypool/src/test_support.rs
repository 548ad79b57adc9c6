// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: temp databases, a manual clock, and helpers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::catalog::{Catalog, CredentialDescriptor};
use crate::clock::ManualClock;
use crate::lease::{AcquireRequest, WaitOptions};
use crate::manager::{LeaseManager, ManagerSettings};
use crate::secret::Secret;
use crate::store::Store;

/// Fixed start time, ten seconds into a minute.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 10).single().unwrap_or_default()
}

/// A fresh database with the schema created. Keep the `TempDir` alive.
pub fn temp_store() -> anyhow::Result<(TempDir, Store)> {
    let dir = tempfile::tempdir()?;
    let store = Store::new(dir.path().join("pool.db"), Duration::from_secs(5));
    store.init()?;
    Ok((dir, store))
}

/// Descriptor with an `api_key` secret derived from its name.
pub fn key(name: &str, concurrency_limit: i64) -> CredentialDescriptor {
    let secret = Secret::api_key(format!("sk-test-{name}-0000"));
    CredentialDescriptor::new(name, secret, concurrency_limit)
}

/// Fast polling, bounded by `max_wait_ms`.
pub fn quick_wait(max_wait_ms: u64) -> WaitOptions {
    WaitOptions::new(Duration::from_millis(max_wait_ms), Duration::from_millis(20))
}

pub fn request(provider: &str, request_id: &str) -> AcquireRequest {
    AcquireRequest::new(provider, request_id)
}

/// A manager over a temp database with a manually driven clock.
pub struct TestPool {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub manager: LeaseManager,
}

impl TestPool {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_settings(ManagerSettings::default()).await
    }

    pub async fn with_settings(settings: ManagerSettings) -> anyhow::Result<Self> {
        let (dir, store) = temp_store()?;
        let clock = Arc::new(ManualClock::new(epoch()));
        let manager = LeaseManager::with_clock(store, settings, clock.clone());
        Ok(Self { dir, clock, manager })
    }

    /// New pool seeded with `catalog`.
    pub async fn seeded(catalog: &Catalog) -> anyhow::Result<Self> {
        let pool = Self::new().await?;
        pool.manager.seed(catalog).await?;
        Ok(pool)
    }

    pub fn store(&self) -> &Store {
        self.manager.store()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Scalar query against the pool database.
    pub fn scalar(&self, sql: &str) -> anyhow::Result<i64> {
        let n = self.store().read(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))?;
        Ok(n)
    }
}

/// Assert that a `Result` is an error whose display contains `needle`.
#[macro_export]
macro_rules! assert_err_contains {
    ($result:expr, $needle:expr) => {{
        let result = $result;
        assert!(result.is_err(), "expected error containing {:?}", $needle);
        if let Err(e) = result {
            let msg = e.to_string();
            assert!(msg.contains($needle), "expected {:?} in {:?}", $needle, msg);
        }
    }};
}
