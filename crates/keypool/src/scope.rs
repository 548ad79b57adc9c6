// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant scope filter for credentials.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const WILDCARD: &str = "*";

/// Which tenants may lease a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TenantScope {
    /// Any tenant.
    #[default]
    Any,
    /// Only the listed tenant ids.
    Only(BTreeSet<String>),
}

impl TenantScope {
    /// Parse the stored form: `*` or empty for any tenant, else a comma list.
    pub fn parse(raw: &str) -> Self {
        let ids: BTreeSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if ids.is_empty() || ids.contains(WILDCARD) {
            Self::Any
        } else {
            Self::Only(ids)
        }
    }

    pub fn permits(&self, tenant: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(ids) => ids.contains(tenant),
        }
    }

    /// The stored form, inverse of [`TenantScope::parse`].
    pub fn to_stored(&self) -> String {
        match self {
            Self::Any => WILDCARD.to_owned(),
            Self::Only(ids) => ids.iter().map(String::as_str).collect::<Vec<_>>().join(","),
        }
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_stored())
    }
}

impl Serialize for TenantScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_stored())
    }
}

impl<'de> Deserialize<'de> for TenantScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self::parse(&text),
            Raw::List(items) => Self::parse(&items.join(",")),
        })
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
