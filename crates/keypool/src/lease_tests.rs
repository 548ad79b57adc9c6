// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::catalog::{self, Catalog};
use crate::test_support::{epoch, key, temp_store};

fn seeded_store() -> anyhow::Result<(tempfile::TempDir, crate::store::Store, i64)> {
    let (dir, store) = temp_store()?;
    let catalog = Catalog::new().with("p", key("k1", 2));
    store.write(|tx| catalog::upsert(tx, &catalog, epoch()))?;
    let id = store
        .read(|c| catalog::credential_id(c, "p", "k1"))?
        .ok_or_else(|| anyhow::anyhow!("credential missing"))?;
    Ok((dir, store, id))
}

fn req(id: &str) -> AcquireRequest {
    AcquireRequest::new("p", id).requester(Requester::new("alice", "s1", "acme"))
}

#[yare::parameterized(
    active   = { "active", Some(LeaseState::Active) },
    released = { "released", Some(LeaseState::Released) },
    error    = { "error", Some(LeaseState::Error) },
    expired  = { "expired", Some(LeaseState::Expired) },
    unknown  = { "stale", None },
)]
fn lease_state_parse(raw: &str, expected: Option<LeaseState>) {
    assert_eq!(LeaseState::parse(raw), expected);
    if let Some(state) = expected {
        assert_eq!(state.as_str(), raw);
    }
}

#[test]
fn final_state_parses_case_insensitively() -> anyhow::Result<()> {
    assert_eq!("ERROR".parse::<FinalState>()?, FinalState::Error);
    assert_eq!("released".parse::<FinalState>()?, FinalState::Released);
    assert!("expired".parse::<FinalState>().is_err());
    assert_eq!(LeaseState::from(FinalState::Error), LeaseState::Error);
    Ok(())
}

#[test]
fn heartbeat_and_finish_only_touch_active() -> anyhow::Result<()> {
    let (_dir, store, cred) = seeded_store()?;
    store.write(|tx| insert(tx, "l1", cred, &req("r1"), 1_000, 60_000))?;

    assert!(store.write(|tx| touch(tx, "l1", 2_000))?);
    assert!(store.write(|tx| finish(tx, "l1", FinalState::Released, 3_000))?);
    assert!(!store.write(|tx| finish(tx, "l1", FinalState::Error, 4_000))?);
    assert!(!store.write(|tx| touch(tx, "l1", 5_000))?);
    assert!(!store.write(|tx| touch(tx, "missing", 5_000))?);

    let record = store.read(|c| get(c, "l1"))?.ok_or_else(|| anyhow::anyhow!("lease missing"))?;
    assert_eq!(record.state, LeaseState::Released);
    assert_eq!(record.last_heartbeat_at.timestamp_millis(), 2_000);
    assert_eq!(record.released_at.map(|t| t.timestamp_millis()), Some(3_000));
    assert_eq!(record.requester.tenant, "acme");
    Ok(())
}

#[test]
fn reclaim_uses_each_lease_ttl() -> anyhow::Result<()> {
    let (_dir, store, cred) = seeded_store()?;
    store.write(|tx| {
        insert(tx, "short", cred, &req("r1"), 0, 10_000)?;
        insert(tx, "long", cred, &req("r2"), 0, 60_000)?;
        Ok(())
    })?;

    assert_eq!(store.write(|tx| reclaim_stale(tx, 10_000, None))?, 0);
    assert_eq!(store.write(|tx| reclaim_stale(tx, 10_001, None))?, 1);
    assert_eq!(store.read(|c| get(c, "long"))?.map(|l| l.state), Some(LeaseState::Active));

    // An explicit window overrides the TTL.
    assert_eq!(store.write(|tx| reclaim_stale(tx, 20_000, Some(5_000)))?, 1);
    let states: Vec<LeaseState> =
        store.read(|c| list(c, 10))?.into_iter().map(|l| l.state).collect();
    assert_eq!(states, vec![LeaseState::Expired, LeaseState::Expired]);
    Ok(())
}

#[test]
fn wait_options_no_wait_keeps_defaults() {
    let opts = WaitOptions::no_wait();
    assert!(!opts.wait);
    assert_eq!(opts.max_wait, WaitOptions::default().max_wait);
}
