// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only views of the pool for dashboards and the CLI.
//!
//! These read outside any transaction and may be momentarily stale. They
//! never feed an admission decision.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::clock::{from_epoch_ms, minute_bucket};
use crate::error::PoolError;
use crate::lease::{self, LeaseRecord, WaiterRecord};
use crate::manager::LeaseManager;
use crate::queue;

/// Load and limits of one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialUsage {
    pub credential_id: i64,
    pub key_name: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub active_leases: i64,
    pub concurrency_limit: i64,
    pub bucket_units: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_limit: Option<i64>,
    pub priority: i64,
    pub tenant_scope: String,
}

/// Snapshot of one provider's queue and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub waiting: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_request_id: Option<String>,
    pub credentials: Vec<CredentialUsage>,
    pub observed_at: DateTime<Utc>,
}

fn provider_status(
    conn: &Connection,
    provider: &str,
    now: DateTime<Utc>,
) -> Result<ProviderStatus, PoolError> {
    let bucket = minute_bucket(now);
    let mut stmt = conn.prepare(
        "SELECT c.credential_id, c.key_name, c.is_active, c.expires_at, c.concurrency_limit,
                c.rpm_limit, c.priority, c.tenant_scope,
                (SELECT COUNT(*) FROM leases l
                  WHERE l.credential_id = c.credential_id AND l.state = 'active'),
                COALESCE((SELECT u.units FROM usage_minute u
                  WHERE u.credential_id = c.credential_id AND u.minute_bucket = ?2), 0)
         FROM credentials c WHERE c.provider = ?1 ORDER BY c.credential_id",
    )?;
    let rows = stmt.query_map(params![provider, bucket], |row| {
        Ok(CredentialUsage {
            credential_id: row.get(0)?,
            key_name: row.get(1)?,
            active: row.get(2)?,
            expires_at: row.get::<_, Option<i64>>(3)?.map(from_epoch_ms),
            concurrency_limit: row.get(4)?,
            rpm_limit: row.get(5)?,
            priority: row.get(6)?,
            tenant_scope: row.get(7)?,
            active_leases: row.get(8)?,
            bucket_units: row.get(9)?,
        })
    })?;
    let credentials = rows.collect::<Result<Vec<_>, _>>()?;

    Ok(ProviderStatus {
        provider: provider.to_owned(),
        waiting: queue::waiting_count(conn, provider)?,
        head_request_id: queue::head(conn, provider)?.map(|h| h.request_id),
        credentials,
        observed_at: now,
    })
}

impl LeaseManager {
    /// Queue depth and per-credential load for `provider`.
    pub async fn provider_status(&self, provider: &str) -> Result<ProviderStatus, PoolError> {
        let provider = provider.to_owned();
        let now = self.now();
        self.store().blocking(move |s| s.read(|conn| provider_status(conn, &provider, now))).await
    }

    /// Most recent leases, newest first.
    pub async fn list_leases(&self, limit: usize) -> Result<Vec<LeaseRecord>, PoolError> {
        self.store().blocking(move |s| s.read(|conn| lease::list(conn, limit))).await
    }

    pub async fn get_lease(&self, lease_id: &str) -> Result<Option<LeaseRecord>, PoolError> {
        let id = lease_id.to_owned();
        self.store().blocking(move |s| s.read(|conn| lease::get(conn, &id))).await
    }

    /// Queue tickets in FIFO order across providers.
    pub async fn list_waiters(&self, limit: usize) -> Result<Vec<WaiterRecord>, PoolError> {
        self.store().blocking(move |s| s.read(|conn| queue::list(conn, limit))).await
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
