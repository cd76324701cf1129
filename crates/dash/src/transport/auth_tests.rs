// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

use super::{accepts_query_token, constant_time_eq, validate_bearer, validate_query};
use crate::error::ErrorCode;

fn bearer(value: &str) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().map_err(|e| anyhow::anyhow!("{e}"))?);
    Ok(headers)
}

#[test]
fn no_token_allows_all() {
    assert!(validate_bearer(&HeaderMap::new(), None).is_ok());
    assert!(validate_query("", None).is_ok());
}

#[test]
fn bearer_checks() -> anyhow::Result<()> {
    assert!(validate_bearer(&bearer("Bearer s3cret")?, Some("s3cret")).is_ok());
    assert_eq!(
        validate_bearer(&bearer("Bearer wrong")?, Some("s3cret")).err(),
        Some(ErrorCode::Unauthorized)
    );
    assert_eq!(
        validate_bearer(&bearer("Basic s3cret")?, Some("s3cret")).err(),
        Some(ErrorCode::Unauthorized)
    );
    assert_eq!(validate_bearer(&HeaderMap::new(), Some("s3cret")).err(), Some(ErrorCode::Unauthorized));
    Ok(())
}

#[yare::parameterized(
    only      = { "token=abc", true },
    among     = { "cursor=3&token=abc", true },
    wrong     = { "token=abd", false },
    prefix    = { "token=ab", false },
    missing   = { "cursor=3", false },
)]
fn query_checks(query: &str, ok: bool) {
    assert_eq!(validate_query(query, Some("abc")).is_ok(), ok);
}

#[test]
fn constant_time_eq_lengths() {
    assert!(constant_time_eq("", ""));
    assert!(!constant_time_eq("a", "ab"));
}

#[test]
fn query_token_only_on_streams() {
    assert!(accepts_query_token("/ws/ssh_shell/web"));
    assert!(accepts_query_token("/api/logs/stream/42"));
    assert!(!accepts_query_token("/api/ssh/sessions"));
}
