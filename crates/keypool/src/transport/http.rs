// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the pool API.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{pool_error_response, ErrorCode};
use crate::lease::{AcquireRequest, FinalState, Requester, WaitOptions};
use crate::transport::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
}

/// Per-request wait overrides. Unset fields use the server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct WaitParams {
    #[serde(default)]
    pub wait: Option<bool>,
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl WaitParams {
    fn resolve(&self, defaults: WaitOptions) -> WaitOptions {
        WaitOptions {
            wait: self.wait.unwrap_or(defaults.wait),
            max_wait: self.max_wait_ms.map(Duration::from_millis).unwrap_or(defaults.max_wait),
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AcquireBody {
    pub provider: String,
    /// Generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub requester: Requester,
    #[serde(default)]
    pub lease_ttl_secs: Option<u64>,
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(flatten)]
    pub wait: WaitParams,
}

fn default_units() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    #[serde(default)]
    pub state: FinalState,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeBody {
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(flatten)]
    pub wait: WaitParams,
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        db: s.manager.store().path().display().to_string(),
    })
}

/// `POST /api/v1/leases`: acquire a credential, waiting per the body.
pub async fn acquire(
    State(s): State<Arc<AppState>>,
    Json(body): Json<AcquireBody>,
) -> impl IntoResponse {
    if body.provider.trim().is_empty() {
        return ErrorCode::BadRequest.to_http_response("provider is required").into_response();
    }
    if body.lease_ttl_secs == Some(0) {
        return ErrorCode::BadRequest
            .to_http_response("lease_ttl_secs must be at least 1")
            .into_response();
    }
    let request_id = body.request_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut req = AcquireRequest::new(body.provider.trim(), request_id)
        .requester(body.requester.clone())
        .units(body.units);
    if let Some(ttl) = body.lease_ttl_secs {
        req = req.lease_ttl(Duration::from_secs(ttl));
    }
    let opts = body.wait.resolve(s.wait);

    match s.manager.acquire(&req, &opts, None).await {
        Ok(lease) => Json(lease).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `GET /api/v1/leases`: most recent leases.
pub async fn list_leases(
    State(s): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> impl IntoResponse {
    match s.manager.list_leases(q.limit()).await {
        Ok(leases) => Json(leases).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `GET /api/v1/leases/{id}`
pub async fn get_lease(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.manager.get_lease(&id).await {
        Ok(Some(lease)) => Json(lease).into_response(),
        Ok(None) => ErrorCode::NotFound.to_http_response(format!("no lease {id}")).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `POST /api/v1/leases/{id}/heartbeat`
pub async fn heartbeat(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.manager.heartbeat(&id).await {
        Ok(updated) => Json(serde_json::json!({ "updated": updated })).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `POST /api/v1/leases/{id}/release`
pub async fn release(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReleaseBody>,
) -> impl IntoResponse {
    match s.manager.release(&id, body.state).await {
        Ok(released) => Json(serde_json::json!({ "released": released })).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `POST /api/v1/credentials/{id}/consume`: meter units without a new lease.
pub async fn consume(
    State(s): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ConsumeBody>,
) -> impl IntoResponse {
    let opts = body.wait.resolve(WaitOptions { wait: false, ..s.wait });
    match s.manager.consume_units(id, body.units, &opts, None).await {
        Ok(()) => Json(serde_json::json!({ "consumed": body.units })).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `POST /api/v1/catalog`: validate and upsert a catalog.
pub async fn seed(
    State(s): State<Arc<AppState>>,
    Json(catalog): Json<Catalog>,
) -> impl IntoResponse {
    match s.manager.seed(&catalog).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `POST /api/v1/sweep`: run one maintenance pass now.
pub async fn sweep(
    State(s): State<Arc<AppState>>,
    Query(q): Query<SweepQuery>,
) -> impl IntoResponse {
    Json(s.manager.sweep(q.stale_after_secs.map(Duration::from_secs)).await)
}

/// `GET /api/v1/providers/{provider}/status`
pub async fn provider_status(
    State(s): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> impl IntoResponse {
    match s.manager.provider_status(&provider).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}

/// `GET /api/v1/waiters`: queue tickets in FIFO order.
pub async fn list_waiters(
    State(s): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> impl IntoResponse {
    match s.manager.list_waiters(q.limit()).await {
        Ok(waiters) => Json(waiters).into_response(),
        Err(e) => pool_error_response(&e).into_response(),
    }
}
