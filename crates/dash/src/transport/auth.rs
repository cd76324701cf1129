// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorCode;
use crate::transport::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers.
///
/// Returns `Ok(())` when `expected` is `None` (auth disabled) or when the
/// header matches.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ErrorCode::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Validate a `token=` pair from a query string.
pub fn validate_query(query: &str, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let matched = query
        .split('&')
        .filter_map(|pair| pair.strip_prefix("token="))
        .any(|value| constant_time_eq(value, expected));
    if matched {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Streaming endpoints are opened by browser APIs that cannot set headers,
/// so they may carry the token in the query string instead.
fn accepts_query_token(path: &str) -> bool {
    path.starts_with("/ws/") || path.starts_with("/api/logs/stream/")
}

/// Axum middleware enforcing the bearer token on every route except health.
///
/// When `auth_token` is unset, all requests pass through.
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/api/health" {
        return next.run(req).await;
    }

    let expected = state.config.auth_token.as_deref();
    let mut result = validate_bearer(req.headers(), expected);
    if result.is_err() && accepts_query_token(path) {
        result = validate_query(req.uri().query().unwrap_or(""), expected);
    }
    if let Err(code) = result {
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
