// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket server: router, shared state, auth layer.

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;

pub use state::AppState;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(http::health))
        .route("/api/ssh/config", get(http::ssh::get_config).post(http::ssh::save_config))
        .route("/api/ssh/connect", post(http::ssh::connect))
        .route("/api/ssh/disconnect", post(http::ssh::disconnect))
        .route("/api/ssh/sessions", get(http::ssh::sessions))
        .route("/api/ssh/execute", post(http::ssh::execute))
        .route("/api/ssh/system_info", post(http::ssh::system_info))
        .route("/ws/ssh_shell/{conn_id}", get(ws::ssh_shell))
        .route("/api/scripts", get(http::process::scripts))
        .route("/api/start", post(http::process::start))
        .route("/api/stop", post(http::process::stop))
        .route("/api/kill", post(http::process::kill))
        .route("/api/processes", get(http::process::processes))
        .route("/api/logs/{pid}", get(http::logs::logs))
        .route("/api/logs/stream/{pid}", get(http::logs::stream))
        .route("/api/system/info", get(http::system::info))
        .route(
            "/api/config/monitor",
            get(http::system::get_monitor_config).post(http::system::save_monitor_config),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
