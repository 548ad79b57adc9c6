// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::lease::WaitOptions;
use crate::manager::ManagerSettings;
use crate::sweep::SweepPolicy;

/// Shared-store and lease-policy settings used by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct PoolConfig {
    /// Path to the shared SQLite database.
    #[arg(long, default_value = "keypool.db", env = "KEYPOOL_DB")]
    pub db: PathBuf,

    /// How long a connection waits on a locked database, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "KEYPOOL_BUSY_TIMEOUT_MS")]
    pub busy_timeout_ms: u64,

    /// Default lease TTL in seconds.
    #[arg(long, default_value_t = 120, env = "KEYPOOL_LEASE_TTL_SECS")]
    pub lease_ttl_secs: u64,

    /// Default upper bound on a blocking acquire or consume, in seconds.
    #[arg(long, default_value_t = 60, env = "KEYPOOL_MAX_WAIT_SECS")]
    pub max_wait_secs: u64,

    /// Default interval between admission attempts, in milliseconds.
    #[arg(long, default_value_t = 1000, env = "KEYPOOL_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Minute buckets older than this are deleted by the sweep.
    #[arg(long, default_value_t = 30, env = "KEYPOOL_USAGE_RETENTION_MINS")]
    pub usage_retention_mins: u64,

    /// Tickets waiting longer than this are expired by the sweep.
    #[arg(long, default_value_t = 21600, env = "KEYPOOL_WAITER_ABANDON_SECS")]
    pub waiter_abandon_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("keypool.db"),
            busy_timeout_ms: 5000,
            lease_ttl_secs: 120,
            max_wait_secs: 60,
            poll_interval_ms: 1000,
            usage_retention_mins: 30,
            waiter_abandon_secs: 21600,
        }
    }
}

impl PoolConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn usage_retention(&self) -> Duration {
        Duration::from_secs(self.usage_retention_mins * 60)
    }

    pub fn waiter_abandon(&self) -> Duration {
        Duration::from_secs(self.waiter_abandon_secs)
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.max_wait(), self.poll_interval())
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            lease_ttl: self.lease_ttl(),
            wait: self.wait_options(),
            sweep: SweepPolicy {
                usage_retention: self.usage_retention(),
                waiter_abandon: self.waiter_abandon(),
            },
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.db.as_os_str().is_empty() {
            anyhow::bail!("--db must not be empty");
        }
        if self.lease_ttl_secs == 0 {
            anyhow::bail!("--lease-ttl-secs must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("--poll-interval-ms must be at least 1");
        }
        if self.usage_retention_mins < 2 {
            // The current and previous minute must survive a sweep.
            anyhow::bail!("--usage-retention-mins must be at least 2");
        }
        if self.waiter_abandon_secs <= self.max_wait_secs {
            // A requester still inside its wait must keep its ticket.
            anyhow::bail!("--waiter-abandon-secs must exceed --max-wait-secs");
        }
        Ok(())
    }
}

/// Settings for `keypool serve`.
#[derive(Debug, Clone, clap::Args)]
pub struct ServeConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "KEYPOOL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9850, env = "KEYPOOL_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "KEYPOOL_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Maintenance sweep interval in milliseconds. 0 disables the sweeper.
    #[arg(long, default_value_t = 30000, env = "KEYPOOL_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// Catalog JSON file seeded at startup. Falls back to `KEY_POOL_JSON`.
    #[arg(long, env = "KEYPOOL_CATALOG")]
    pub catalog: Option<PathBuf>,
}

impl ServeConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
