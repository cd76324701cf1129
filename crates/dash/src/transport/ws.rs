// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tracing::debug;

use crate::remote::bridge;
use crate::transport::state::AppState;

/// `GET /ws/ssh_shell/{conn_id}`: upgrade and bridge to the session's shell.
///
/// Unknown ids are reported inside the socket, not as an HTTP error, so
/// browser clients see the message.
pub async fn ssh_shell(
    State(state): State<Arc<AppState>>,
    Path(conn_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        debug!(conn_id = %conn_id, "shell socket opened");
        bridge::run(&state.registry, &conn_id, socket).await;
        debug!(conn_id = %conn_id, "shell socket closed");
    })
}
