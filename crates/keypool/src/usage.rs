// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-credential, per-minute unit counters.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::{minute_bucket, secs_to_next_minute};
use crate::error::PoolError;
use crate::wait::WaitStatus;

/// Units recorded for a credential in one minute bucket.
pub(crate) fn bucket_units(
    conn: &Connection,
    credential_id: i64,
    bucket: i64,
) -> Result<i64, PoolError> {
    let units = conn
        .query_row(
            "SELECT units FROM usage_minute WHERE credential_id = ?1 AND minute_bucket = ?2",
            params![credential_id, bucket],
            |row| row.get(0),
        )
        .optional()?;
    Ok(units.unwrap_or(0))
}

/// Add units to a bucket, creating it on first use.
pub(crate) fn add_units(
    conn: &Connection,
    credential_id: i64,
    bucket: i64,
    units: u32,
) -> Result<(), PoolError> {
    conn.execute(
        "INSERT INTO usage_minute (credential_id, minute_bucket, units) VALUES (?1, ?2, ?3)
         ON CONFLICT (credential_id, minute_bucket) DO UPDATE SET units = units + excluded.units",
        params![credential_id, bucket, units],
    )?;
    Ok(())
}

/// Delete buckets that start before `cutoff_bucket`.
pub(crate) fn trim(conn: &Connection, cutoff_bucket: i64) -> Result<usize, PoolError> {
    let n = conn
        .execute("DELETE FROM usage_minute WHERE minute_bucket < ?1", params![cutoff_bucket])?;
    Ok(n)
}

/// Result of one metering attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Metered {
    Charged,
    /// No such credential; nothing was recorded.
    Unknown,
    Over(WaitStatus),
}

/// Charge `units` against a credential's current minute if they fit.
/// Runs inside the caller's immediate transaction.
pub(crate) fn try_consume(
    conn: &Connection,
    credential_id: i64,
    units: u32,
    now: DateTime<Utc>,
) -> Result<Metered, PoolError> {
    let row: Option<(String, Option<i64>)> = conn
        .query_row(
            "SELECT provider, rpm_limit FROM credentials WHERE credential_id = ?1",
            params![credential_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((provider, rpm_limit)) = row else {
        return Ok(Metered::Unknown);
    };

    let bucket = minute_bucket(now);
    if let Some(limit) = rpm_limit.filter(|l| *l > 0) {
        let current = bucket_units(conn, credential_id, bucket)?;
        if current + i64::from(units) > limit {
            return Ok(Metered::Over(WaitStatus::WaitingRpm {
                provider,
                credential_id,
                current,
                rpm_limit: limit,
                units,
                retry_after_secs: secs_to_next_minute(now),
            }));
        }
    }
    add_units(conn, credential_id, bucket, units)?;
    Ok(Metered::Charged)
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
