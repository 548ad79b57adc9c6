// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

fn temp_store() -> anyhow::Result<(tempfile::TempDir, Store)> {
    let dir = tempfile::tempdir()?;
    let store = Store::new(dir.path().join("pool.db"), Duration::from_secs(5));
    store.init()?;
    Ok((dir, store))
}

#[test]
fn init_is_idempotent_and_records_version() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.init()?;
    let version = store.read(|conn| Ok(schema::schema_version(conn)?))?;
    assert_eq!(version, schema::SCHEMA_VERSION);
    Ok(())
}

#[test]
fn connections_use_wal_and_foreign_keys() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let conn = store.connect()?;
    let mode: String = conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?;
    let fk: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    assert_eq!(mode.to_lowercase(), "wal");
    assert_eq!(fk, 1);
    Ok(())
}

#[test]
fn failed_write_rolls_back() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let result: Result<(), PoolError> = store.write(|tx| {
        tx.execute(
            "INSERT INTO waiters (provider, request_id, enqueued_at, state, updated_at)
             VALUES ('p', 'r1', 0, 'waiting', 0)",
            [],
        )?;
        Err(PoolError::Corrupt("abort".into()))
    });
    assert!(result.is_err());

    let count: i64 =
        store.read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM waiters", [], |r| r.get(0))?))?;
    assert_eq!(count, 0);
    Ok(())
}

#[test]
fn lease_requires_known_credential() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let result = store.write(|tx| {
        tx.execute(
            "INSERT INTO leases (lease_id, credential_id, provider, request_id, state,
                                 acquired_at, last_heartbeat_at, ttl_ms)
             VALUES ('l1', 99, 'p', 'r1', 'active', 0, 0, 1000)",
            [],
        )?;
        Ok(())
    });
    assert!(matches!(result, Err(PoolError::Store(_))));
    Ok(())
}

#[tokio::test]
async fn blocking_runs_off_runtime() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let version = store.blocking(|s| s.read(|conn| Ok(schema::schema_version(conn)?))).await?;
    assert_eq!(version, schema::SCHEMA_VERSION);
    Ok(())
}
