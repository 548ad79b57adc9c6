// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured reasons a request is not (yet) admitted.
//!
//! Every denied attempt carries one of these so callers and UIs can show
//! something actionable instead of a bare failure.

use serde::{Deserialize, Serialize};

/// Why no credential could be granted to the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Every eligible key is at its concurrency limit.
    Concurrency,
    /// Every eligible key is out of per-minute budget.
    Rpm,
    /// Both limits are in the way.
    ConcurrencyAndRpm,
    /// No key is eligible at all (inactive, expired, out of scope, or none configured).
    NoKeys,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concurrency => "concurrency",
            Self::Rpm => "rpm",
            Self::ConcurrencyAndRpm => "concurrency_and_rpm",
            Self::NoKeys => "no_keys",
        }
    }
}

/// Counts behind a [`BlockReason`], over keys that pass scope/active/expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub total_keys: u32,
    pub concurrency_ok: u32,
    pub rpm_ok: u32,
    pub both_ok: u32,
}

impl Diagnosis {
    /// Classify the block. Only meaningful when `both_ok == 0`.
    pub fn reason(&self) -> BlockReason {
        if self.total_keys == 0 {
            return BlockReason::NoKeys;
        }
        match (self.concurrency_ok > 0, self.rpm_ok > 0) {
            (true, false) => BlockReason::Rpm,
            (false, true) => BlockReason::Concurrency,
            // Keys split between the two limits, or none pass either.
            _ => BlockReason::ConcurrencyAndRpm,
        }
    }
}

/// Progress report for a request that must wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WaitStatus {
    /// An earlier request for the same provider is still queued.
    WaitingTurn {
        provider: String,
        request_id: String,
        /// 1-based position among waiting tickets.
        position: u64,
        head_request_id: String,
    },
    /// This request is at the head but no key has room.
    WaitingKey {
        provider: String,
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<u64>,
        reason: BlockReason,
        /// Seconds until the next minute bucket, only when purely rate-bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
        diagnosis: Diagnosis,
    },
    /// Standalone metering hit the credential's per-minute limit.
    WaitingRpm {
        provider: String,
        credential_id: i64,
        current: i64,
        rpm_limit: i64,
        units: u32,
        retry_after_secs: u64,
    },
}

impl WaitStatus {
    /// Short machine-readable label: `waiting_turn`, a block reason, or `rpm`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WaitingTurn { .. } => "waiting_turn",
            Self::WaitingKey { reason, .. } => reason.as_str(),
            Self::WaitingRpm { .. } => BlockReason::Rpm.as_str(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::WaitingTurn { provider, .. }
            | Self::WaitingKey { provider, .. }
            | Self::WaitingRpm { provider, .. } => provider,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::WaitingTurn { .. } => None,
            Self::WaitingKey { retry_after_secs, .. } => *retry_after_secs,
            Self::WaitingRpm { retry_after_secs, .. } => Some(*retry_after_secs),
        }
    }
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
