// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One atomic admission attempt.
//!
//! Runs inside a single `BEGIN IMMEDIATE` transaction: reclaim stale leases,
//! register the ticket, check the queue head, pick a credential, then either
//! grant it or explain why not.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::clock::{epoch_ms, minute_bucket, secs_to_next_minute};
use crate::error::PoolError;
use crate::lease::{self, AcquireRequest, Lease};
use crate::queue;
use crate::secret::Secret;
use crate::select;
use crate::usage;
use crate::wait::{BlockReason, WaitStatus};

/// Outcome of one attempt.
#[derive(Debug, Clone)]
pub(crate) enum Attempt {
    Granted(Lease),
    Wait(WaitStatus),
}

/// Inputs that stay fixed for the whole attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptCtx<'a> {
    pub req: &'a AcquireRequest,
    pub ttl_ms: i64,
    pub now: DateTime<Utc>,
    /// Hold a queue ticket. Off for single-shot attempts.
    pub enqueue: bool,
}

pub(crate) fn attempt(conn: &Connection, ctx: AttemptCtx<'_>) -> Result<Attempt, PoolError> {
    let req = ctx.req;
    let now_ms = epoch_ms(ctx.now);

    let reclaimed = lease::reclaim_stale(conn, now_ms, None)?;
    if reclaimed > 0 {
        tracing::info!(reclaimed, provider = %req.provider, "reclaimed stale leases");
    }

    // FIFO gate.
    let position = if ctx.enqueue {
        let seq =
            queue::ensure_ticket(conn, &req.provider, &req.request_id, &req.requester, now_ms)?;
        let head = queue::head(conn, &req.provider)?;
        if let Some(head) = head.filter(|h| h.seq != seq) {
            return Ok(Attempt::Wait(WaitStatus::WaitingTurn {
                provider: req.provider.clone(),
                request_id: req.request_id.clone(),
                position: queue::position(conn, &req.provider, seq)?,
                head_request_id: head.request_id,
            }));
        }
        Some(1)
    } else {
        let head = queue::head(conn, &req.provider)?;
        if let Some(head) = head.filter(|h| h.request_id != req.request_id) {
            return Ok(Attempt::Wait(WaitStatus::WaitingTurn {
                provider: req.provider.clone(),
                request_id: req.request_id.clone(),
                position: queue::waiting_count(conn, &req.provider)? + 1,
                head_request_id: head.request_id,
            }));
        }
        None
    };

    let bucket = minute_bucket(ctx.now);
    let candidates =
        select::candidates(conn, &req.provider, &req.requester.tenant, now_ms, bucket)?;

    let Some(chosen) = select::pick(&candidates, req.units) else {
        let diagnosis = select::diagnose(&candidates, req.units);
        let reason = diagnosis.reason();
        let retry_after_secs = (reason == BlockReason::Rpm).then(|| secs_to_next_minute(ctx.now));
        return Ok(Attempt::Wait(WaitStatus::WaitingKey {
            provider: req.provider.clone(),
            request_id: req.request_id.clone(),
            position,
            reason,
            retry_after_secs,
            diagnosis,
        }));
    };

    let lease_id = uuid::Uuid::new_v4().to_string();
    lease::insert(conn, &lease_id, chosen.credential_id, req, now_ms, ctx.ttl_ms)?;
    usage::add_units(conn, chosen.credential_id, bucket, req.units)?;
    queue::remove(conn, &req.provider, &req.request_id)?;

    let raw: String = conn.query_row(
        "SELECT secret FROM credentials WHERE credential_id = ?1",
        params![chosen.credential_id],
        |row| row.get(0),
    )?;
    let secret = Secret::from_json(&raw).map_err(|e| {
        PoolError::Corrupt(format!("credential {} secret: {e}", chosen.credential_id))
    })?;

    Ok(Attempt::Granted(Lease {
        lease_id,
        credential_id: chosen.credential_id,
        provider: req.provider.clone(),
        key_name: chosen.key_name.clone(),
        request_id: req.request_id.clone(),
        secret,
        acquired_at: ctx.now,
        ttl_ms: u64::try_from(ctx.ttl_ms).unwrap_or(0),
    }))
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
