// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock source and minute-bucket arithmetic.
//!
//! Persisted timestamps are epoch milliseconds (UTC). The clock is injected
//! into the manager so tests can move time without sleeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

const MINUTE_MS: i64 = 60_000;

/// Source of "now" for persisted timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock();
        *now += step;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Epoch milliseconds of `t`.
pub fn epoch_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

/// Inverse of [`epoch_ms`]. Out-of-range values clamp to the epoch.
pub fn from_epoch_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// The rate-limit bucket key for `t`: epoch millis truncated to the minute.
pub fn minute_bucket(t: DateTime<Utc>) -> i64 {
    epoch_ms(t).div_euclid(MINUTE_MS) * MINUTE_MS
}

/// Whole seconds until the next minute boundary, never less than 1.
pub fn secs_to_next_minute(t: DateTime<Utc>) -> u64 {
    let ms = epoch_ms(t);
    let remaining_ms = minute_bucket(t) + MINUTE_MS - ms;
    ((remaining_ms / 1000) as u64).max(1)
}

/// Duration as whole milliseconds, saturating at `i64::MAX`.
pub fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
