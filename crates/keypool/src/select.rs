// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Candidate credentials, ranking, and block diagnosis.
//!
//! Ranking is lexicographic over exact ratios, compared by
//! cross-multiplication so no two processes can disagree on order:
//!
//! 1. active leases / concurrency limit, ascending
//! 2. bucket units / rpm limit, ascending (0 for unlimited keys)
//! 3. priority, descending
//! 4. credential id, ascending

use std::cmp::Ordering;

use rusqlite::{params, Connection};

use crate::error::PoolError;
use crate::scope::TenantScope;
use crate::wait::Diagnosis;

/// A credential that passed the provider/active/expiry/scope filters, with
/// its live load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub credential_id: i64,
    pub key_name: String,
    pub concurrency_limit: i64,
    /// `None` for unlimited.
    pub rpm_limit: Option<i64>,
    pub priority: i64,
    pub active: i64,
    pub bucket_units: i64,
}

impl Candidate {
    pub fn concurrency_ok(&self) -> bool {
        self.active < self.concurrency_limit
    }

    pub fn rpm_ok(&self, units: u32) -> bool {
        match self.rpm_limit {
            None => true,
            Some(limit) => self.bucket_units + i64::from(units) <= limit,
        }
    }

    fn rpm_ratio(&self) -> (i128, i128) {
        match self.rpm_limit {
            Some(limit) => (i128::from(self.bucket_units), i128::from(limit)),
            None => (0, 1),
        }
    }

    /// Total order used to pick the best candidate; smaller is better.
    pub fn rank(&self, other: &Self) -> Ordering {
        cmp_ratio(
            (i128::from(self.active), i128::from(self.concurrency_limit)),
            (i128::from(other.active), i128::from(other.concurrency_limit)),
        )
        .then_with(|| cmp_ratio(self.rpm_ratio(), other.rpm_ratio()))
        .then_with(|| other.priority.cmp(&self.priority))
        .then_with(|| self.credential_id.cmp(&other.credential_id))
    }
}

/// Compare `a.0 / a.1` with `b.0 / b.1` for positive denominators.
fn cmp_ratio(a: (i128, i128), b: (i128, i128)) -> Ordering {
    (a.0 * b.1).cmp(&(b.0 * a.1))
}

/// Best admissible candidate for a request of `units`.
pub(crate) fn pick(candidates: &[Candidate], units: u32) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.concurrency_ok() && c.rpm_ok(units))
        .min_by(|a, b| a.rank(b))
}

/// Count which limits the candidates pass.
pub(crate) fn diagnose(candidates: &[Candidate], units: u32) -> Diagnosis {
    let mut d = Diagnosis { total_keys: candidates.len() as u32, ..Diagnosis::default() };
    for c in candidates {
        let conc = c.concurrency_ok();
        let rpm = c.rpm_ok(units);
        d.concurrency_ok += u32::from(conc);
        d.rpm_ok += u32::from(rpm);
        d.both_ok += u32::from(conc && rpm);
    }
    d
}

/// Load eligible credentials for a provider and tenant with their current load.
pub(crate) fn candidates(
    conn: &Connection,
    provider: &str,
    tenant: &str,
    now_ms: i64,
    bucket: i64,
) -> Result<Vec<Candidate>, PoolError> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.credential_id, c.key_name, c.concurrency_limit, c.rpm_limit, c.priority,
                c.tenant_scope,
                (SELECT COUNT(*) FROM leases l
                  WHERE l.credential_id = c.credential_id AND l.state = 'active'),
                COALESCE((SELECT u.units FROM usage_minute u
                  WHERE u.credential_id = c.credential_id AND u.minute_bucket = ?3), 0)
         FROM credentials c
         WHERE c.provider = ?1 AND c.is_active = 1
           AND (c.expires_at IS NULL OR c.expires_at > ?2)
         ORDER BY c.credential_id",
    )?;
    let rows = stmt.query_map(params![provider, now_ms, bucket], |row| {
        let scope: String = row.get(5)?;
        Ok((
            Candidate {
                credential_id: row.get(0)?,
                key_name: row.get(1)?,
                concurrency_limit: row.get(2)?,
                rpm_limit: row.get::<_, Option<i64>>(3)?.filter(|l| *l > 0),
                priority: row.get(4)?,
                active: row.get(6)?,
                bucket_units: row.get(7)?,
            },
            scope,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (candidate, scope) = row?;
        if TenantScope::parse(&scope).permits(tenant) {
            out.push(candidate);
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
