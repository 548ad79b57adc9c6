// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::*;

#[derive(Debug, Parser)]
struct Harness {
    #[command(flatten)]
    pool: PoolConfig,
    #[command(flatten)]
    serve: ServeConfig,
}

fn parse(args: &[&str]) -> Harness {
    Harness::parse_from(args)
}

#[test]
#[serial_test::serial]
fn defaults_match_documented_values() -> anyhow::Result<()> {
    let h = parse(&["keypool"]);
    h.pool.validate()?;
    assert_eq!(h.pool.lease_ttl(), Duration::from_secs(120));
    assert_eq!(h.pool.max_wait(), Duration::from_secs(60));
    assert_eq!(h.pool.poll_interval(), Duration::from_secs(1));
    assert_eq!(h.pool.usage_retention(), Duration::from_secs(30 * 60));
    assert_eq!(h.pool.waiter_abandon(), Duration::from_secs(6 * 3600));
    assert_eq!(h.serve.sweep_interval(), Some(Duration::from_secs(30)));
    assert!(h.serve.auth_token.is_none());
    Ok(())
}

#[test]
#[serial_test::serial]
fn flags_override_defaults() -> anyhow::Result<()> {
    let h = parse(&[
        "keypool",
        "--db",
        "/tmp/pool.db",
        "--lease-ttl-secs",
        "30",
        "--poll-interval-ms",
        "250",
        "--sweep-interval-ms",
        "0",
    ]);
    h.pool.validate()?;
    let settings = h.pool.manager_settings();
    assert_eq!(settings.lease_ttl, Duration::from_secs(30));
    assert_eq!(settings.wait.poll_interval, Duration::from_millis(250));
    assert!(settings.wait.wait);
    assert_eq!(h.serve.sweep_interval(), None);
    Ok(())
}

#[test]
#[serial_test::serial]
fn env_fallback_applies() {
    std::env::set_var("KEYPOOL_LEASE_TTL_SECS", "45");
    let h = parse(&["keypool"]);
    std::env::remove_var("KEYPOOL_LEASE_TTL_SECS");
    assert_eq!(h.pool.lease_ttl_secs, 45);
}

#[yare::parameterized(
    zero_ttl       = { &["keypool", "--lease-ttl-secs", "0"], "lease-ttl" },
    zero_poll      = { &["keypool", "--poll-interval-ms", "0"], "poll-interval" },
    tiny_retention = { &["keypool", "--usage-retention-mins", "1"], "usage-retention" },
    short_abandon  = { &["keypool", "--waiter-abandon-secs", "60"], "waiter-abandon" },
    long_wait      = {
        &["keypool", "--max-wait-secs", "600", "--waiter-abandon-secs", "300"],
        "waiter-abandon"
    },
)]
fn validate_rejects(args: &[&str], needle: &str) {
    let h = parse(args);
    let err = h.pool.validate().err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains(needle), "{err}");
}
