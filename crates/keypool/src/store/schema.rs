// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table definitions for the shared pool database.

use rusqlite::Connection;

/// Bumped when a table definition changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const TABLES: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    credential_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    provider          TEXT    NOT NULL,
    key_name          TEXT    NOT NULL,
    secret            TEXT    NOT NULL,
    concurrency_limit INTEGER NOT NULL CHECK (concurrency_limit >= 1),
    rpm_limit         INTEGER,
    priority          INTEGER NOT NULL DEFAULT 0,
    tenant_scope      TEXT    NOT NULL DEFAULT '*',
    is_active         INTEGER NOT NULL DEFAULT 1,
    expires_at        INTEGER,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL,
    UNIQUE (provider, key_name)
);

CREATE TABLE IF NOT EXISTS leases (
    lease_id          TEXT    PRIMARY KEY,
    credential_id     INTEGER NOT NULL REFERENCES credentials (credential_id),
    provider          TEXT    NOT NULL,
    request_id        TEXT    NOT NULL,
    user_id           TEXT    NOT NULL DEFAULT '',
    session_id        TEXT    NOT NULL DEFAULT '',
    tenant_id         TEXT    NOT NULL DEFAULT '',
    state             TEXT    NOT NULL,
    acquired_at       INTEGER NOT NULL,
    last_heartbeat_at INTEGER NOT NULL,
    released_at       INTEGER,
    ttl_ms            INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_leases_credential_state ON leases (credential_id, state);
CREATE INDEX IF NOT EXISTS idx_leases_state_heartbeat ON leases (state, last_heartbeat_at);

CREATE TABLE IF NOT EXISTS usage_minute (
    credential_id INTEGER NOT NULL REFERENCES credentials (credential_id),
    minute_bucket INTEGER NOT NULL,
    units         INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (credential_id, minute_bucket)
);

CREATE TABLE IF NOT EXISTS waiters (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    provider    TEXT    NOT NULL,
    request_id  TEXT    NOT NULL,
    user_id     TEXT    NOT NULL DEFAULT '',
    session_id  TEXT    NOT NULL DEFAULT '',
    tenant_id   TEXT    NOT NULL DEFAULT '',
    enqueued_at INTEGER NOT NULL,
    state       TEXT    NOT NULL,
    updated_at  INTEGER NOT NULL,
    UNIQUE (provider, request_id)
);
CREATE INDEX IF NOT EXISTS idx_waiters_provider_state_seq ON waiters (provider, state, seq);
";

/// Create every table and index. Safe to run repeatedly.
pub fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(TABLES)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// The `user_version` recorded by [`create_tables`].
pub fn schema_version(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}
