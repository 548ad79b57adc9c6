// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keypool: leases scarce API credentials to competing requesters with
//! per-key concurrency and per-minute rate caps, strict per-provider FIFO,
//! and heartbeat/TTL reclamation, over a SQLite file shared by every process.

mod admission;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod lease;
pub mod manager;
mod queue;
pub mod scope;
pub mod secret;
mod select;
pub mod status;
pub mod store;
pub mod stress;
pub mod sweep;
pub mod test_support;
pub mod transport;
mod usage;
pub mod wait;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use crate::catalog::{Catalog, CredentialDescriptor, SeedReport};
pub use crate::config::{PoolConfig, ServeConfig};
pub use crate::error::PoolError;
pub use crate::lease::{AcquireRequest, FinalState, Lease, Requester, WaitOptions};
pub use crate::manager::{LeaseManager, ManagerSettings, OnWait};
pub use crate::secret::Secret;
pub use crate::sweep::{spawn_sweeper, SweepReport};
pub use crate::wait::{BlockReason, Diagnosis, WaitStatus};

/// Load the startup catalog: the `--catalog` file if given, else `KEY_POOL_JSON`.
pub fn startup_catalog(serve: &ServeConfig) -> Result<Option<Catalog>, PoolError> {
    match serve.catalog {
        Some(ref path) => Catalog::load(path).map(Some),
        None => Catalog::from_env(),
    }
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run(
    pool: PoolConfig,
    serve: ServeConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let catalog = startup_catalog(&serve)?;
    let manager = LeaseManager::bootstrap(&pool, catalog.as_ref()).await?;

    let sweeper = serve
        .sweep_interval()
        .map(|every| spawn_sweeper(manager.clone(), every, shutdown.child_token()));

    let state = Arc::new(transport::AppState::new(manager, serve.auth_token.clone()));
    let router = transport::build_router(state);

    let addr = format!("{}:{}", serve.host, serve.port);
    let listener = TcpListener::bind(&addr).await?;
    if serve.auth_token.is_some() {
        tracing::info!("keypool listening on {addr} (auth enabled)");
    } else {
        tracing::info!("keypool listening on {addr}");
    }
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    Ok(())
}
