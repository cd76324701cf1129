// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    bad_request = { ErrorCode::BadRequest, 400, "BAD_REQUEST" },
    unauthorized = { ErrorCode::Unauthorized, 401, "UNAUTHORIZED" },
    not_found = { ErrorCode::NotFound, 404, "NOT_FOUND" },
    conflict = { ErrorCode::Conflict, 409, "CONFLICT" },
    not_connected = { ErrorCode::NotConnected, 409, "NOT_CONNECTED" },
    connect_failed = { ErrorCode::ConnectFailed, 502, "CONNECT_FAILED" },
    channel_failed = { ErrorCode::ChannelFailed, 502, "CHANNEL_FAILED" },
    process_failed = { ErrorCode::ProcessFailed, 500, "PROCESS_FAILED" },
    not_implemented = { ErrorCode::NotImplemented, 501, "NOT_IMPLEMENTED" },
    internal = { ErrorCode::Internal, 500, "INTERNAL" },
)]
fn status_and_wire_name(code: ErrorCode, status: u16, name: &str) {
    assert_eq!(code.http_status(), status);
    assert_eq!(code.as_str(), name);
    assert_eq!(code.to_string(), name);
}

#[test]
fn http_response_envelope() -> anyhow::Result<()> {
    let (status, body) = ErrorCode::NotFound.to_http_response("no such session");
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json = serde_json::to_value(&body.0)?;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(json["error"]["message"], "no such session");
    Ok(())
}
