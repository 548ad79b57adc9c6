// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::{HeaderMap, HeaderValue};

use super::*;

fn headers(auth: Option<&'static str>) -> HeaderMap {
    let mut h = HeaderMap::new();
    if let Some(v) = auth {
        h.insert("authorization", HeaderValue::from_static(v));
    }
    h
}

#[yare::parameterized(
    auth_disabled    = { None, None, true },
    matching_token   = { Some("s3cret"), Some("Bearer s3cret"), true },
    wrong_token      = { Some("s3cret"), Some("Bearer nope"), false },
    prefix_of_token  = { Some("s3cret"), Some("Bearer s3c"), false },
    missing_header   = { Some("s3cret"), None, false },
    missing_scheme   = { Some("s3cret"), Some("s3cret"), false },
)]
fn bearer(expected: Option<&str>, header: Option<&'static str>, ok: bool) {
    assert_eq!(validate_bearer(&headers(header), expected).is_ok(), ok);
}

#[yare::parameterized(
    health         = { "/api/v1/health", true },
    acquire        = { "/api/v1/leases", false },
    status         = { "/api/v1/providers/p/status", false },
    health_subpath = { "/api/v1/health/x", false },
)]
fn public_routes(path: &str, public: bool) {
    assert_eq!(is_public(path), public);
}
