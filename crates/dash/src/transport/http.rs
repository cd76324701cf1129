// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the dashboard REST API.

pub mod logs;
pub mod process;
pub mod ssh;
pub mod system;

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::process::ProcessError;
use crate::remote::RemoteError;
use crate::transport::state::AppState;

/// Handler error rendered as the JSON error envelope.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.code.to_http_response(self.message).into_response()
    }
}

impl From<RemoteError> for ApiError {
    fn from(e: RemoteError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(format!("{e:#}"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(e.to_string())
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Body of mutating endpoints that have nothing else to report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self { success: true, message: message.into() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub ssh_sessions: usize,
    pub processes: usize,
}

/// `GET /api/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        uptime_secs: s.started_at.elapsed().as_secs(),
        ssh_sessions: s.registry.len(),
        processes: s.processes.len(),
    })
}
