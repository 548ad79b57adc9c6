// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-provider FIFO of fairness tickets.
//!
//! Order is the autoincrement `seq`, so tickets enqueued by different
//! processes never depend on wall-clock agreement.

use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::from_epoch_ms;
use crate::error::PoolError;
use crate::lease::{Requester, WaiterRecord, WaiterState};

/// The earliest waiting ticket for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Head {
    pub seq: i64,
    pub request_id: String,
}

/// Make sure `(provider, request_id)` holds a waiting ticket and return its seq.
///
/// A live ticket only has `updated_at` refreshed. A ticket that maintenance
/// expired while its requester kept polling goes back to the tail.
pub(crate) fn ensure_ticket(
    conn: &Connection,
    provider: &str,
    request_id: &str,
    requester: &Requester,
    now_ms: i64,
) -> Result<i64, PoolError> {
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT seq, state FROM waiters WHERE provider = ?1 AND request_id = ?2",
            params![provider, request_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((seq, state)) = existing {
        if state == WaiterState::Waiting.as_str() {
            conn.execute(
                "UPDATE waiters SET updated_at = ?2 WHERE seq = ?1",
                params![seq, now_ms],
            )?;
            return Ok(seq);
        }
        tracing::debug!(provider, request_id, state, "re-enqueueing stale ticket");
        conn.execute("DELETE FROM waiters WHERE seq = ?1", params![seq])?;
    }

    conn.execute(
        "INSERT INTO waiters (provider, request_id, user_id, session_id, tenant_id,
                              enqueued_at, state, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'waiting', ?6)",
        params![
            provider,
            request_id,
            requester.user,
            requester.session,
            requester.tenant,
            now_ms
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn head(conn: &Connection, provider: &str) -> Result<Option<Head>, PoolError> {
    let head = conn
        .query_row(
            "SELECT seq, request_id FROM waiters
             WHERE provider = ?1 AND state = 'waiting'
             ORDER BY seq LIMIT 1",
            params![provider],
            |row| Ok(Head { seq: row.get(0)?, request_id: row.get(1)? }),
        )
        .optional()?;
    Ok(head)
}

/// 1-based position of ticket `seq` among waiting tickets.
pub(crate) fn position(conn: &Connection, provider: &str, seq: i64) -> Result<u64, PoolError> {
    let ahead: i64 = conn.query_row(
        "SELECT COUNT(*) FROM waiters WHERE provider = ?1 AND state = 'waiting' AND seq <= ?2",
        params![provider, seq],
        |row| row.get(0),
    )?;
    Ok(ahead.max(1) as u64)
}

pub(crate) fn waiting_count(conn: &Connection, provider: &str) -> Result<u64, PoolError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM waiters WHERE provider = ?1 AND state = 'waiting'",
        params![provider],
        |row| row.get(0),
    )?;
    Ok(n.max(0) as u64)
}

/// Drop the ticket for a request. Returns whether one existed.
pub(crate) fn remove(
    conn: &Connection,
    provider: &str,
    request_id: &str,
) -> Result<bool, PoolError> {
    let n = conn.execute(
        "DELETE FROM waiters WHERE provider = ?1 AND request_id = ?2",
        params![provider, request_id],
    )?;
    Ok(n > 0)
}

/// Mark tickets waiting since before `cutoff_ms` as expired.
pub(crate) fn expire_abandoned(
    conn: &Connection,
    cutoff_ms: i64,
    now_ms: i64,
) -> Result<usize, PoolError> {
    let n = conn.execute(
        "UPDATE waiters SET state = 'expired', updated_at = ?2
         WHERE state = 'waiting' AND enqueued_at < ?1",
        params![cutoff_ms, now_ms],
    )?;
    Ok(n)
}

/// Delete non-waiting tickets last touched before `cutoff_ms`.
pub(crate) fn purge_finished(conn: &Connection, cutoff_ms: i64) -> Result<usize, PoolError> {
    let n = conn.execute(
        "DELETE FROM waiters WHERE state != 'waiting' AND updated_at < ?1",
        params![cutoff_ms],
    )?;
    Ok(n)
}

/// Tickets in queue order, across providers.
pub(crate) fn list(conn: &Connection, limit: usize) -> Result<Vec<WaiterRecord>, PoolError> {
    let mut stmt = conn.prepare(
        "SELECT seq, provider, request_id, user_id, session_id, tenant_id, state,
                enqueued_at, updated_at
         FROM waiters ORDER BY seq LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            Requester { user: row.get(3)?, session: row.get(4)?, tenant: row.get(5)? },
            row.get::<_, String>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, i64>(8)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (seq, provider, request_id, requester, state, enqueued_at, updated_at) = row?;
        let state = WaiterState::parse(&state)
            .ok_or_else(|| PoolError::Corrupt(format!("waiter {seq} has state {state:?}")))?;
        out.push(WaiterRecord {
            seq,
            provider,
            request_id,
            requester,
            state,
            enqueued_at: from_epoch_ms(enqueued_at),
            updated_at: from_epoch_ms(updated_at),
        });
    }
    Ok(out)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
