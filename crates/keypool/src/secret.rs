// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque credential payloads.
//!
//! A secret is a small string map (`api_key`, or `access_key` + `secret_key`,
//! or whatever the provider needs). It is handed to lease holders verbatim but
//! only ever rendered redacted in `Debug` output and logs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Field name used when a catalog entry gives the secret as a bare string.
pub const DEFAULT_SECRET_FIELD: &str = "api_key";

/// Credential payload delivered to the lease holder.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Secret(BTreeMap<String, String>);

impl Secret {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }

    /// Shorthand for a single `api_key` field.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self(BTreeMap::from([(DEFAULT_SECRET_FIELD.to_owned(), key.into())]))
    }

    /// Cleartext fields. Callers must not log these.
    pub fn expose(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First field whose value is blank, if any.
    pub fn blank_field(&self) -> Option<&str> {
        self.0.iter().find(|(_, v)| v.trim().is_empty()).map(|(k, _)| k.as_str())
    }

    /// Copy with every value masked.
    pub fn redacted(&self) -> BTreeMap<String, String> {
        self.0.iter().map(|(k, v)| (k.clone(), redact(v))).collect()
    }

    pub(crate) fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub(crate) fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&self.redacted()).finish()
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Key(String),
            Fields(BTreeMap<String, String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Key(key) => Self::api_key(key.trim()),
            Raw::Fields(fields) => {
                Self(fields.into_iter().map(|(k, v)| (k, v.trim().to_owned())).collect())
            }
        })
    }
}

/// Mask a sensitive value: short values become `***`, longer ones keep two
/// characters at each end.
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "***".to_owned();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
#[path = "secret_tests.rs"]
mod tests;
