// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential catalog: typed descriptors, validation, and seeding.
//!
//! A catalog maps provider names to credential descriptors. Seeding upserts
//! by `(provider, name)` so credential ids, and the lease and usage history
//! keyed to them, survive repeated seeding.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::clock::epoch_ms;
use crate::error::PoolError;
use crate::scope::TenantScope;
use crate::secret::Secret;

/// Environment variable holding an inline JSON catalog.
pub const CATALOG_ENV: &str = "KEY_POOL_JSON";

/// One credential as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CredentialDescriptor {
    pub name: String,
    pub secret: Secret,
    pub concurrency_limit: i64,
    /// Absent, zero or negative means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_limit: Option<i64>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub tenant_scope: TenantScope,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl CredentialDescriptor {
    pub fn new(name: impl Into<String>, secret: Secret, concurrency_limit: i64) -> Self {
        Self {
            name: name.into(),
            secret,
            concurrency_limit,
            rpm_limit: None,
            priority: 0,
            tenant_scope: TenantScope::Any,
            active: true,
            expires_at: None,
        }
    }

    pub fn rpm_limit(mut self, rpm: i64) -> Self {
        self.rpm_limit = Some(rpm);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn tenant_scope(mut self, scope: TenantScope) -> Self {
        self.tenant_scope = scope;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Stored rate limit: `None` for unlimited.
    fn stored_rpm(&self) -> Option<i64> {
        self.rpm_limit.filter(|rpm| *rpm > 0)
    }
}

/// Provider name to its credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog(BTreeMap<String, Vec<CredentialDescriptor>>);

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor under `provider`.
    pub fn with(mut self, provider: impl Into<String>, descriptor: CredentialDescriptor) -> Self {
        self.0.entry(provider.into()).or_default().push(descriptor);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = (&str, &[CredentialDescriptor])> {
        self.0.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    /// Total number of descriptors across providers.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_json(raw: &str) -> Result<Self, PoolError> {
        serde_json::from_str(raw).map_err(|e| PoolError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, PoolError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Catalog from [`CATALOG_ENV`], or `None` when unset or blank.
    pub fn from_env() -> Result<Option<Self>, PoolError> {
        match std::env::var(CATALOG_ENV) {
            Ok(raw) if !raw.trim().is_empty() => Self::from_json(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Reject the whole catalog on the first malformed descriptor.
    pub fn validate(&self) -> Result<(), PoolError> {
        for (provider, descriptors) in &self.0 {
            if provider.trim().is_empty() {
                return Err(PoolError::Config("provider name is blank".into()));
            }
            let mut seen = HashSet::new();
            for (index, d) in descriptors.iter().enumerate() {
                let at = format!("{provider}[{index}]");
                if d.name.trim().is_empty() {
                    return Err(PoolError::Config(format!("{at}: name is blank")));
                }
                if !seen.insert(d.name.trim()) {
                    return Err(PoolError::Config(format!(
                        "{at}: duplicate credential name {:?}",
                        d.name
                    )));
                }
                if d.secret.is_empty() {
                    return Err(PoolError::Config(format!("{at} ({}): secret is empty", d.name)));
                }
                if let Some(field) = d.secret.blank_field() {
                    return Err(PoolError::Config(format!(
                        "{at} ({}): secret field {field:?} is blank",
                        d.name
                    )));
                }
                if d.concurrency_limit < 1 {
                    return Err(PoolError::Config(format!(
                        "{at} ({}): concurrencyLimit must be at least 1, got {}",
                        d.name, d.concurrency_limit
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a seed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub updated: usize,
}

/// Upsert every descriptor. Callers validate first and run this in one transaction.
pub(crate) fn upsert(
    conn: &Connection,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Result<SeedReport, PoolError> {
    let now_ms = epoch_ms(now);
    let mut report = SeedReport::default();
    for (provider, descriptors) in catalog.providers() {
        for d in descriptors {
            let name = d.name.trim();
            let secret = d.secret.to_json().map_err(|e| PoolError::Config(e.to_string()))?;
            let existing = credential_id(conn, provider, name)?;
            let rpm = d.stored_rpm();
            let scope = d.tenant_scope.to_stored();
            let expires = d.expires_at.map(epoch_ms);
            let values = params![
                provider,
                name,
                secret,
                d.concurrency_limit,
                rpm,
                d.priority,
                scope,
                d.active,
                expires,
                now_ms,
            ];
            match existing {
                Some(_) => {
                    conn.execute(
                        "UPDATE credentials SET secret = ?3, concurrency_limit = ?4,
                             rpm_limit = ?5, priority = ?6, tenant_scope = ?7, is_active = ?8,
                             expires_at = ?9, updated_at = ?10
                         WHERE provider = ?1 AND key_name = ?2",
                        values,
                    )?;
                    report.updated += 1;
                }
                None => {
                    conn.execute(
                        "INSERT INTO credentials (provider, key_name, secret, concurrency_limit,
                             rpm_limit, priority, tenant_scope, is_active, expires_at,
                             created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                        values,
                    )?;
                    report.inserted += 1;
                }
            }
        }
    }
    Ok(report)
}

/// Look up a credential id by its catalog identity.
pub(crate) fn credential_id(
    conn: &Connection,
    provider: &str,
    name: &str,
) -> Result<Option<i64>, PoolError> {
    let id = conn
        .query_row(
            "SELECT credential_id FROM credentials WHERE provider = ?1 AND key_name = ?2",
            params![provider, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
