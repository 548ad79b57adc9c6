// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wait::{BlockReason, Diagnosis};

fn key_wait() -> WaitStatus {
    WaitStatus::WaitingKey {
        provider: "openai".into(),
        request_id: "req-1".into(),
        position: Some(1),
        reason: BlockReason::Rpm,
        retry_after_secs: Some(17),
        diagnosis: Diagnosis { total_keys: 1, concurrency_ok: 1, rpm_ok: 0, both_ok: 0 },
    }
}

#[yare::parameterized(
    timeout     = { PoolError::timeout("p", 5000, None), ErrorCode::Timeout, 408 },
    unavailable = { PoolError::unavailable("p", key_wait()), ErrorCode::NoCapacity, 429 },
    config      = { PoolError::Config("bad".into()), ErrorCode::BadRequest, 400 },
    corrupt     = { PoolError::Corrupt("row".into()), ErrorCode::Internal, 500 },
)]
fn maps_to_error_code(err: PoolError, code: ErrorCode, status: u16) {
    let mapped = ErrorCode::from(&err);
    assert_eq!(mapped, code);
    assert_eq!(mapped.http_status(), status);
}

#[test]
fn timeout_message_names_scope_and_reason() {
    let err = PoolError::timeout("openai", 2500, Some(key_wait()));
    let msg = err.to_string();
    assert!(msg.contains("[openai]"), "{msg}");
    assert!(msg.contains("2500ms"), "{msg}");
    assert!(msg.contains("rpm"), "{msg}");
    assert!(err.is_retryable());
}

#[test]
fn config_errors_are_not_retryable() {
    assert!(!PoolError::Config("x".into()).is_retryable());
}

#[test]
fn response_carries_wait_status() {
    let err = PoolError::unavailable("openai", key_wait());
    let (status, axum::Json(body)) = pool_error_response(&err);
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body.error.code, "NO_CAPACITY");
    assert_eq!(body.status, Some(key_wait()));
}
