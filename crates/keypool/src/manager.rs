// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease manager: the service object every caller goes through.
//!
//! Admission decisions live in the shared store, so any number of
//! processes can run a manager against the same database. Within one
//! process, releases and sweeps wake polling acquirers early; across
//! processes the poll interval bounds how stale a waiter's view can be.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::admission::{self, Attempt, AttemptCtx};
use crate::catalog::{self, Catalog, SeedReport};
use crate::clock::{duration_ms, epoch_ms, Clock, SystemClock};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lease::{self, AcquireRequest, FinalState, Lease, WaitOptions};
use crate::queue;
use crate::store::Store;
use crate::sweep::SweepPolicy;
use crate::usage::{self, Metered};
use crate::wait::WaitStatus;

/// Progress callback invoked with each wait status between attempts.
pub type OnWait = dyn Fn(&WaitStatus) + Send + Sync;

/// Defaults applied when a call leaves a knob unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub lease_ttl: Duration,
    pub wait: WaitOptions,
    pub sweep: SweepPolicy,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(120),
            wait: WaitOptions::default(),
            sweep: SweepPolicy::default(),
        }
    }
}

/// Handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct LeaseManager {
    store: Store,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    settings: ManagerSettings,
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LeaseManager {
    pub fn new(store: Store, settings: ManagerSettings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Store, settings: ManagerSettings, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, wake: Arc::new(Notify::new()), settings }
    }

    /// Open the store, create the schema, seed `catalog` if given, and sweep once.
    pub async fn bootstrap(
        config: &PoolConfig,
        catalog: Option<&Catalog>,
    ) -> Result<Self, PoolError> {
        let store = Store::new(&config.db, config.busy_timeout());
        store.blocking(|s| s.init()).await?;
        let manager = Self::new(store, config.manager_settings());
        if let Some(catalog) = catalog {
            manager.seed(catalog).await?;
        }
        let report = manager.sweep(None).await;
        tracing::info!(
            db = %config.db.display(),
            expired_leases = report.expired_leases,
            "bootstrap: pool ready"
        );
        Ok(manager)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn wake_waiters(&self) {
        self.wake.notify_waiters();
    }

    /// Validate and upsert a catalog in one transaction.
    pub async fn seed(&self, catalog: &Catalog) -> Result<SeedReport, PoolError> {
        catalog.validate()?;
        let catalog = catalog.clone();
        let now = self.now();
        let report =
            self.store.blocking(move |s| s.write(|tx| catalog::upsert(tx, &catalog, now))).await?;
        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            "seed: catalog applied"
        );
        self.wake_waiters();
        Ok(report)
    }

    /// Acquire a credential for `req`, waiting per `opts`.
    ///
    /// Honours strict per-provider FIFO. The request's queue ticket is gone
    /// when this returns, whatever the outcome. When the returned future is
    /// dropped, cleanup runs after any in-flight attempt has committed, and a
    /// lease that attempt granted is released as `error`.
    pub async fn acquire(
        &self,
        req: &AcquireRequest,
        opts: &WaitOptions,
        on_wait: Option<&OnWait>,
    ) -> Result<Lease, PoolError> {
        let started = Instant::now();
        let deadline = started + opts.max_wait;
        let ttl_ms = duration_ms(req.lease_ttl.unwrap_or(self.settings.lease_ttl));
        let mut guard = AttemptGuard::new(self, req, opts.wait);

        let outcome = loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let status = match guard.run(self.spawn_attempt(req, ttl_ms, opts.wait)).await {
                Ok(Attempt::Granted(lease)) => break Ok(lease),
                Ok(Attempt::Wait(status)) => status,
                Err(e) => break Err(e),
            };
            if !opts.wait {
                break Err(PoolError::unavailable(&req.provider, status));
            }
            if let Some(cb) = on_wait {
                cb(&status);
            }
            tracing::debug!(
                provider = %req.provider,
                request_id = %req.request_id,
                state = status.code(),
                "acquire: waiting"
            );

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                break Err(PoolError::timeout(&req.provider, waited_ms, Some(status)));
            }
            let nap = opts.poll_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = &mut notified => {}
            }
        };

        match &outcome {
            Ok(lease) => {
                tracing::info!(
                    provider = %lease.provider,
                    request_id = %lease.request_id,
                    lease_id = %lease.lease_id,
                    credential_id = lease.credential_id,
                    key = %lease.key_name,
                    "acquire: granted"
                );
                // The grant removed the ticket in the same transaction.
                guard.disarm();
                self.wake_waiters();
            }
            Err(e) => {
                tracing::info!(
                    provider = %req.provider,
                    request_id = %req.request_id,
                    err = %e,
                    "acquire: failed"
                );
                if guard.disarm() {
                    self.forget_ticket(&req.provider, &req.request_id).await;
                }
            }
        }
        outcome
    }

    fn spawn_attempt(&self, req: &AcquireRequest, ttl_ms: i64, enqueue: bool) -> InFlight {
        let (store, req, now) = (self.store.clone(), req.clone(), self.now());
        tokio::task::spawn_blocking(move || {
            store.write(|tx| admission::attempt(tx, AttemptCtx { req: &req, ttl_ms, now, enqueue }))
        })
    }

    /// Remove a request's ticket, logging rather than failing.
    async fn forget_ticket(&self, provider: &str, request_id: &str) {
        let (p, r) = (provider.to_owned(), request_id.to_owned());
        match self.store.blocking(move |s| s.write(|tx| queue::remove(tx, &p, &r))).await {
            Ok(true) => self.wake_waiters(),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(provider, request_id, err = %e, "acquire: ticket removal failed")
            }
        }
    }

    /// Refresh a lease's heartbeat. `false` when the lease is unknown or terminal.
    pub async fn heartbeat(&self, lease_id: &str) -> Result<bool, PoolError> {
        let id = lease_id.to_owned();
        let now_ms = epoch_ms(self.now());
        let updated =
            self.store.blocking(move |s| s.write(|tx| lease::touch(tx, &id, now_ms))).await?;
        if !updated {
            tracing::debug!(lease_id, "heartbeat: lease not active");
        }
        Ok(updated)
    }

    /// End a lease. `false` when it was unknown or already terminal.
    pub async fn release(&self, lease_id: &str, state: FinalState) -> Result<bool, PoolError> {
        let id = lease_id.to_owned();
        let now_ms = epoch_ms(self.now());
        let released = self
            .store
            .blocking(move |s| s.write(|tx| lease::finish(tx, &id, state, now_ms)))
            .await?;
        if released {
            tracing::info!(lease_id, state = ?state, "release: lease ended");
            self.wake_waiters();
        } else {
            tracing::debug!(lease_id, "release: lease not active");
        }
        Ok(released)
    }

    /// Meter `units` against a credential's per-minute budget, waiting per `opts`.
    ///
    /// Unknown credentials are logged and ignored.
    pub async fn consume_units(
        &self,
        credential_id: i64,
        units: u32,
        opts: &WaitOptions,
        on_wait: Option<&OnWait>,
    ) -> Result<(), PoolError> {
        let started = Instant::now();
        let deadline = started + opts.max_wait;
        let scope = format!("credential {credential_id}");

        loop {
            let now = self.now();
            let metered = self
                .store
                .blocking(move |s| s.write(|tx| usage::try_consume(tx, credential_id, units, now)))
                .await?;
            let status = match metered {
                Metered::Charged => return Ok(()),
                Metered::Unknown => {
                    tracing::warn!(credential_id, units, "consume: unknown credential");
                    return Ok(());
                }
                Metered::Over(status) => status,
            };
            if !opts.wait {
                return Err(PoolError::unavailable(&scope, status));
            }
            if let Some(cb) = on_wait {
                cb(&status);
            }
            let now = Instant::now();
            if now >= deadline {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                return Err(PoolError::timeout(&scope, waited_ms, Some(status)));
            }
            tokio::time::sleep(opts.poll_interval.min(deadline - now)).await;
        }
    }

    /// Acquire, run `f` with the lease, then release it as `released` on
    /// success or `error` on failure.
    pub async fn with_lease<T, E, F, Fut>(
        &self,
        req: &AcquireRequest,
        opts: &WaitOptions,
        f: F,
    ) -> Result<T, E>
    where
        E: From<PoolError>,
        F: FnOnce(Lease) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let lease = self.acquire(req, opts, None).await?;
        let lease_id = lease.lease_id.clone();
        let out = f(lease).await;
        let state = if out.is_ok() { FinalState::Released } else { FinalState::Error };
        if let Err(e) = self.release(&lease_id, state).await {
            tracing::warn!(lease_id, err = %e, "with_lease: release failed");
        }
        out
    }
}

/// An admission transaction handed to the blocking pool.
type InFlight = JoinHandle<Result<Attempt, PoolError>>;

/// Tracks what a dropped acquire future must undo: the attempt still
/// running on the blocking pool, and the request's queue ticket.
struct AttemptGuard {
    leftovers: Option<Leftovers>,
    in_flight: Option<InFlight>,
    ticketed: bool,
}

impl AttemptGuard {
    fn new(manager: &LeaseManager, req: &AcquireRequest, ticketed: bool) -> Self {
        let leftovers = Leftovers {
            store: manager.store.clone(),
            clock: Arc::clone(&manager.clock),
            wake: Arc::clone(&manager.wake),
            provider: req.provider.clone(),
            request_id: req.request_id.clone(),
        };
        Self { leftovers: Some(leftovers), in_flight: None, ticketed }
    }

    /// Await an attempt, keeping its handle until it has committed.
    async fn run(&mut self, attempt: InFlight) -> Result<Attempt, PoolError> {
        let pending = self.in_flight.insert(attempt);
        let joined = pending.await;
        self.in_flight = None;
        joined?
    }

    /// Stop cleanup on drop. Returns whether a ticket may still exist.
    fn disarm(&mut self) -> bool {
        self.leftovers = None;
        std::mem::take(&mut self.ticketed)
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let in_flight = self.in_flight.take();
        if in_flight.is_none() && !self.ticketed {
            return;
        }
        let Some(leftovers) = self.leftovers.take() else { return };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                provider = %leftovers.provider,
                request_id = %leftovers.request_id,
                "acquire: cancelled outside a runtime, cleanup left for the sweeper"
            );
            return;
        };
        handle.spawn(leftovers.settle(in_flight, self.ticketed));
    }
}

struct Leftovers {
    store: Store,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    provider: String,
    request_id: String,
}

impl Leftovers {
    /// Wait out the in-flight attempt, then undo its grant and drop the ticket.
    async fn settle(self, in_flight: Option<InFlight>, ticketed: bool) {
        let Self { store, clock, wake, provider, request_id } = self;
        if let Some(attempt) = in_flight {
            match attempt.await.map_err(PoolError::from).and_then(|outcome| outcome) {
                Ok(Attempt::Granted(granted)) => {
                    let now_ms = epoch_ms(clock.now());
                    let id = granted.lease_id;
                    let released = store
                        .blocking(move |s| {
                            s.write(|tx| lease::finish(tx, &id, FinalState::Error, now_ms))
                        })
                        .await;
                    if let Err(e) = released {
                        tracing::warn!(
                            provider = %provider,
                            request_id = %request_id,
                            err = %e,
                            "acquire: cancelled grant could not be released"
                        );
                    } else {
                        tracing::info!(
                            provider = %provider,
                            request_id = %request_id,
                            "acquire: cancelled after grant, lease released"
                        );
                    }
                }
                Ok(Attempt::Wait(_)) => {}
                Err(e) => tracing::warn!(
                    provider = %provider,
                    request_id = %request_id,
                    err = %e,
                    "acquire: cancelled attempt failed"
                ),
            }
        }
        if ticketed {
            let (p, r) = (provider.clone(), request_id.clone());
            let removed = store.blocking(move |s| s.write(|tx| queue::remove(tx, &p, &r))).await;
            if let Err(e) = removed {
                tracing::warn!(
                    provider = %provider,
                    request_id = %request_id,
                    err = %e,
                    "acquire: cancelled ticket removal failed"
                );
            }
        }
        wake.notify_waiters();
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
