// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use super::{ApiResult, SuccessResponse};
use crate::store::MonitorConfig;
use crate::system::{self, SystemSnapshot};
use crate::transport::state::AppState;

/// `GET /api/system/info`
pub async fn info() -> ApiResult<SystemSnapshot> {
    let snapshot = tokio::task::spawn_blocking(system::collect).await?;
    Ok(Json(snapshot))
}

/// `GET /api/config/monitor`
pub async fn get_monitor_config(State(s): State<Arc<AppState>>) -> Json<MonitorConfig> {
    Json(s.monitor_store.load())
}

/// `POST /api/config/monitor`
pub async fn save_monitor_config(
    State(s): State<Arc<AppState>>,
    Json(config): Json<MonitorConfig>,
) -> ApiResult<SuccessResponse> {
    s.monitor_store.save(&config)?;
    Ok(SuccessResponse::ok("Monitor configuration saved"))
}
