// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease and waiter records, and the request/option types for acquiring.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::clock::from_epoch_ms;
use crate::error::PoolError;
use crate::secret::Secret;

/// Lifecycle of a lease. Only `Active` may transition, and only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseState {
    Active,
    Released,
    Error,
    Expired,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
            Self::Error => "error",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "released" => Some(Self::Released),
            "error" => Some(Self::Error),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state a holder may release a lease into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalState {
    #[default]
    Released,
    Error,
}

impl From<FinalState> for LeaseState {
    fn from(state: FinalState) -> Self {
        match state {
            FinalState::Released => Self::Released,
            FinalState::Error => Self::Error,
        }
    }
}

impl std::str::FromStr for FinalState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "released" => Ok(Self::Released),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("invalid final state: {other}"),
        }
    }
}

/// Fairness ticket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaiterState {
    Waiting,
    Acquired,
    Expired,
}

impl WaiterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Acquired => "acquired",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "acquired" => Some(Self::Acquired),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Who is asking for a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub session: String,
    /// Tenant id, matched against each credential's tenant scope.
    #[serde(default)]
    pub tenant: String,
}

impl Requester {
    pub fn new(
        user: impl Into<String>,
        session: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self { user: user.into(), session: session.into(), tenant: tenant.into() }
    }
}

/// A granted credential. Returned to the holder, who heartbeats and releases it.
#[derive(Debug, Clone, Serialize)]
pub struct Lease {
    pub lease_id: String,
    pub credential_id: i64,
    pub provider: String,
    pub key_name: String,
    pub request_id: String,
    pub secret: Secret,
    pub acquired_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl Lease {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Persisted view of a lease, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub lease_id: String,
    pub credential_id: i64,
    pub provider: String,
    pub request_id: String,
    pub requester: Requester,
    pub state: LeaseState,
    pub acquired_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    pub ttl_ms: i64,
}

/// Persisted view of a fairness ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiterRecord {
    pub seq: i64,
    pub provider: String,
    pub request_id: String,
    pub requester: Requester,
    pub state: WaiterState,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters of a single acquire call.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub provider: String,
    /// Unique per logical operation; keys the fairness ticket.
    pub request_id: String,
    pub requester: Requester,
    /// Lease TTL; the manager default applies when unset.
    pub lease_ttl: Option<Duration>,
    /// Rate-limit units charged at grant time.
    pub units: u32,
}

impl AcquireRequest {
    pub fn new(provider: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            request_id: request_id.into(),
            requester: Requester::default(),
            lease_ttl: None,
            units: 1,
        }
    }

    pub fn requester(mut self, requester: Requester) -> Self {
        self.requester = requester;
        self
    }

    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = Some(ttl);
        self
    }

    pub fn units(mut self, units: u32) -> Self {
        self.units = units;
        self
    }
}

/// Blocking behaviour shared by acquire and unit consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// When false, any wait condition fails immediately.
    pub wait: bool,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Self {
        Self { wait: true, max_wait, poll_interval }
    }

    /// Single attempt, no polling.
    pub fn no_wait() -> Self {
        Self { wait: false, ..Self::default() }
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            wait: true,
            max_wait: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Insert a fresh `active` lease.
pub(crate) fn insert(
    conn: &Connection,
    lease_id: &str,
    credential_id: i64,
    req: &AcquireRequest,
    now_ms: i64,
    ttl_ms: i64,
) -> Result<(), PoolError> {
    conn.execute(
        "INSERT INTO leases (lease_id, credential_id, provider, request_id, user_id, session_id,
                             tenant_id, state, acquired_at, last_heartbeat_at, ttl_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?8, ?9)",
        params![
            lease_id,
            credential_id,
            req.provider,
            req.request_id,
            req.requester.user,
            req.requester.session,
            req.requester.tenant,
            now_ms,
            ttl_ms,
        ],
    )?;
    Ok(())
}

/// Expire active leases whose last heartbeat is too old.
///
/// Each lease's own TTL applies unless `stale_after_ms` overrides it.
pub(crate) fn reclaim_stale(
    conn: &Connection,
    now_ms: i64,
    stale_after_ms: Option<i64>,
) -> Result<usize, PoolError> {
    let changed = match stale_after_ms {
        None => conn.execute(
            "UPDATE leases SET state = 'expired', released_at = ?1
             WHERE state = 'active' AND last_heartbeat_at + ttl_ms < ?1",
            params![now_ms],
        )?,
        Some(stale_ms) => conn.execute(
            "UPDATE leases SET state = 'expired', released_at = ?1
             WHERE state = 'active' AND last_heartbeat_at < ?1 - ?2",
            params![now_ms, stale_ms],
        )?,
    };
    Ok(changed)
}

/// Refresh the heartbeat of an active lease. False when unknown or terminal.
pub(crate) fn touch(conn: &Connection, lease_id: &str, now_ms: i64) -> Result<bool, PoolError> {
    let changed = conn.execute(
        "UPDATE leases SET last_heartbeat_at = ?2 WHERE lease_id = ?1 AND state = 'active'",
        params![lease_id, now_ms],
    )?;
    Ok(changed > 0)
}

/// Move an active lease to a terminal state. False when unknown or already terminal.
pub(crate) fn finish(
    conn: &Connection,
    lease_id: &str,
    state: FinalState,
    now_ms: i64,
) -> Result<bool, PoolError> {
    let changed = conn.execute(
        "UPDATE leases SET state = ?2, released_at = ?3 WHERE lease_id = ?1 AND state = 'active'",
        params![lease_id, LeaseState::from(state).as_str(), now_ms],
    )?;
    Ok(changed > 0)
}

struct LeaseRow {
    lease_id: String,
    credential_id: i64,
    provider: String,
    request_id: String,
    requester: Requester,
    state: String,
    acquired_at: i64,
    last_heartbeat_at: i64,
    released_at: Option<i64>,
    ttl_ms: i64,
}

impl LeaseRow {
    fn into_record(self) -> Result<LeaseRecord, PoolError> {
        let state = LeaseState::parse(&self.state).ok_or_else(|| {
            PoolError::Corrupt(format!("lease {} has state {:?}", self.lease_id, self.state))
        })?;
        Ok(LeaseRecord {
            lease_id: self.lease_id,
            credential_id: self.credential_id,
            provider: self.provider,
            request_id: self.request_id,
            requester: self.requester,
            state,
            acquired_at: from_epoch_ms(self.acquired_at),
            last_heartbeat_at: from_epoch_ms(self.last_heartbeat_at),
            released_at: self.released_at.map(from_epoch_ms),
            ttl_ms: self.ttl_ms,
        })
    }
}

const LEASE_COLUMNS: &str = "lease_id, credential_id, provider, request_id, user_id, session_id,
     tenant_id, state, acquired_at, last_heartbeat_at, released_at, ttl_ms";

fn lease_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LeaseRow> {
    Ok(LeaseRow {
        lease_id: row.get(0)?,
        credential_id: row.get(1)?,
        provider: row.get(2)?,
        request_id: row.get(3)?,
        requester: Requester { user: row.get(4)?, session: row.get(5)?, tenant: row.get(6)? },
        state: row.get(7)?,
        acquired_at: row.get(8)?,
        last_heartbeat_at: row.get(9)?,
        released_at: row.get(10)?,
        ttl_ms: row.get(11)?,
    })
}

/// Look up one lease by id.
pub(crate) fn get(conn: &Connection, lease_id: &str) -> Result<Option<LeaseRecord>, PoolError> {
    let sql = format!("SELECT {LEASE_COLUMNS} FROM leases WHERE lease_id = ?1");
    let row = conn.query_row(&sql, params![lease_id], lease_row).optional()?;
    row.map(LeaseRow::into_record).transpose()
}

/// Most recent leases first.
pub(crate) fn list(conn: &Connection, limit: usize) -> Result<Vec<LeaseRecord>, PoolError> {
    let sql = format!(
        "SELECT {LEASE_COLUMNS} FROM leases ORDER BY acquired_at DESC, lease_id LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit as i64], lease_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.into_record()?);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
