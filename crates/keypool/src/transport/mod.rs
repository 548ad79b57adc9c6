// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the lease manager.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::lease::WaitOptions;
use crate::manager::LeaseManager;

/// Shared state behind every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: LeaseManager,
    /// Bearer token for API auth. `None` disables auth.
    pub auth_token: Option<String>,
    /// Wait behaviour for requests that do not override it.
    pub wait: WaitOptions,
}

impl AppState {
    pub fn new(manager: LeaseManager, auth_token: Option<String>) -> Self {
        let wait = manager.settings().wait;
        Self { manager, auth_token, wait }
    }
}

/// Build the axum `Router` with all pool routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Leases
        .route("/api/v1/leases", post(http::acquire).get(http::list_leases))
        .route("/api/v1/leases/{id}", get(http::get_lease))
        .route("/api/v1/leases/{id}/heartbeat", post(http::heartbeat))
        .route("/api/v1/leases/{id}/release", post(http::release))
        // Metering
        .route("/api/v1/credentials/{id}/consume", post(http::consume))
        // Catalog and maintenance
        .route("/api/v1/catalog", post(http::seed))
        .route("/api/v1/sweep", post(http::sweep))
        // Status
        .route("/api/v1/providers/{provider}/status", get(http::provider_status))
        .route("/api/v1/waiters", get(http::list_waiters))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
