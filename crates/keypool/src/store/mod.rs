// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared SQLite store.
//!
//! Every caller, in this process or another, opens its own connection to
//! the same database file. `BEGIN IMMEDIATE` transactions serialize all
//! writers and are the only mutual exclusion the pool relies on.

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use crate::error::PoolError;

/// Handle to the pool database. Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self { path: Arc::new(path.into()), busy_timeout }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection with WAL journaling, foreign keys and the busy timeout.
    pub fn connect(&self) -> Result<Connection, PoolError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(self.path.as_path(), flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::debug!(path = %self.path.display(), mode, "journal mode is not WAL");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    /// Create the schema if it does not exist yet.
    pub fn init(&self) -> Result<(), PoolError> {
        let conn = self.connect()?;
        schema::create_tables(&conn)?;
        Ok(())
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction, committing on `Ok`.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` on a fresh connection outside any explicit transaction.
    /// Only for reporting; admission never reads through here.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run blocking store work off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, PoolError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, PoolError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
