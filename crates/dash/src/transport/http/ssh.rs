// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Saved connections and remote session lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, ApiResult, SuccessResponse};
use crate::error::ErrorCode;
use crate::remote::host_info::{self, RemoteSystemInfo};
use crate::remote::{ConnectTarget, Credential, RemoteSession, SessionInfo};
use crate::store::SshConfig;
use crate::transport::state::AppState;

fn default_port() -> u16 {
    22
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub conn_id: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl ConnectRequest {
    fn into_target(self) -> Result<(String, ConnectTarget), ApiError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let (Some(host), Some(username)) = (non_empty(self.host), non_empty(self.username)) else {
            return Err(ApiError::bad_request("host and username are required"));
        };
        let Some(conn_id) = non_empty(self.conn_id) else {
            return Err(ApiError::bad_request("conn_id is required"));
        };
        let credential = match self.key_file {
            Some(path) => Credential::KeyFile { path, passphrase: self.passphrase },
            None => Credential::Password(self.password.unwrap_or_default()),
        };
        Ok((conn_id, ConnectTarget { host, port: self.port, username, credential }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub message: String,
    pub conn_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnIdRequest {
    #[serde(default)]
    pub conn_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfoResponse {
    pub success: bool,
    pub system_info: RemoteSystemInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub conn_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// `GET /api/ssh/config`
pub async fn get_config(State(s): State<Arc<AppState>>) -> Json<SshConfig> {
    Json(s.ssh_store.load())
}

/// `POST /api/ssh/config`
pub async fn save_config(
    State(s): State<Arc<AppState>>,
    Json(doc): Json<SshConfig>,
) -> ApiResult<SuccessResponse> {
    let dups = doc.duplicate_names();
    if !dups.is_empty() {
        return Err(ApiError::bad_request(format!(
            "duplicate connection names: {}",
            dups.join(", ")
        )));
    }
    s.ssh_store.save(&doc)?;
    Ok(SuccessResponse::ok("SSH configuration saved"))
}

/// `POST /api/ssh/connect`
///
/// An existing session under the same id is disconnected before the new
/// handshake; the new session is registered only once it has connected.
pub async fn connect(
    State(s): State<Arc<AppState>>,
    Json(req): Json<ConnectRequest>,
) -> ApiResult<ConnectResponse> {
    let (conn_id, target) = req.into_target()?;
    // Absent is fine: this is a fresh connect.
    let _ = s.registry.remove(&conn_id).await;

    let session = Arc::new(RemoteSession::new(
        conn_id.clone(),
        target,
        Arc::clone(&s.client),
        Arc::clone(&s.filter),
        s.session_settings,
    ));
    session.connect().await?;
    s.registry.put(session).await;
    info!(conn_id = %conn_id, "session registered");

    Ok(Json(ConnectResponse {
        success: true,
        message: "SSH connection established".to_owned(),
        conn_id,
    }))
}

/// `POST /api/ssh/disconnect`
pub async fn disconnect(
    State(s): State<Arc<AppState>>,
    Json(req): Json<ConnIdRequest>,
) -> ApiResult<SuccessResponse> {
    let Some(conn_id) = req.conn_id else {
        return Err(ApiError::bad_request("conn_id is required"));
    };
    s.registry.remove(&conn_id).await?;
    Ok(SuccessResponse::ok("SSH connection closed"))
}

/// `GET /api/ssh/sessions`
pub async fn sessions(State(s): State<Arc<AppState>>) -> Json<Vec<SessionInfo>> {
    Json(s.registry.list())
}

/// `POST /api/ssh/system_info`: CPU, memory and disks of the remote host.
pub async fn system_info(
    State(s): State<Arc<AppState>>,
    Json(req): Json<ConnIdRequest>,
) -> ApiResult<SystemInfoResponse> {
    let Some(conn_id) = req.conn_id else {
        return Err(ApiError::bad_request("conn_id is required"));
    };
    let session = s.registry.get(&conn_id)?;
    let system_info = host_info::collect(&session).await?;
    Ok(Json(SystemInfoResponse { success: true, system_info }))
}

/// `POST /api/ssh/execute`: reserved, never executes.
pub async fn execute(
    State(s): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<SuccessResponse> {
    let (Some(conn_id), Some(_)) = (req.conn_id, req.command) else {
        return Err(ApiError::bad_request("conn_id and command are required"));
    };
    s.registry.get(&conn_id)?;
    Err(ApiError::new(ErrorCode::NotImplemented, "command execution is not implemented"))
}
