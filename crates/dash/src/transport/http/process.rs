// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script discovery, launch and termination handlers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, SuccessResponse};
use crate::log_buffer::TIMESTAMP_FORMAT;
use crate::process::{ProcessSpec, ProcessSummary, RunStatus};
use crate::scripts::{self, ScriptEntry};
use crate::system::{self, InterpreterProcess};
use crate::transport::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub script_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
    pub pid: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PidRequest {
    #[serde(default)]
    pub pid: Option<u32>,
}

impl PidRequest {
    fn pid(&self) -> Result<u32, ApiError> {
        self.pid.ok_or_else(|| ApiError::bad_request("PID is required"))
    }
}

/// One row of `GET /api/processes`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessEntry {
    #[serde(flatten)]
    pub process: InterpreterProcess,
    pub managed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

/// `GET /api/scripts`
pub async fn scripts(State(s): State<Arc<AppState>>) -> ApiResult<Vec<ScriptEntry>> {
    let config = s.monitor_store.load();
    let base = s.base_dir.clone();
    let found = tokio::task::spawn_blocking(move || scripts::discover(&base, &config)).await?;
    Ok(Json(found))
}

/// `POST /api/start`
pub async fn start(
    State(s): State<Arc<AppState>>,
    Json(req): Json<StartRequest>,
) -> ApiResult<StartResponse> {
    let Some(script_path) = req.script_path.filter(|p| !p.trim().is_empty()) else {
        return Err(ApiError::bad_request("Script path is required"));
    };
    let config = s.monitor_store.load();
    let resolved = scripts::resolve_launch(&s.base_dir, &config, &script_path)?;
    let spec = ProcessSpec::script(&s.config.interpreter, &resolved);
    let name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(script_path);

    let process = s.processes.spawn(spec)?;
    let pid = process.pid();
    Ok(Json(StartResponse {
        success: true,
        message: format!("Script {name} started with PID {pid}"),
        pid,
    }))
}

/// `POST /api/stop`: managed processes only.
pub async fn stop(
    State(s): State<Arc<AppState>>,
    Json(req): Json<PidRequest>,
) -> ApiResult<SuccessResponse> {
    let pid = req.pid()?;
    let outcome = s.processes.stop(pid).await?;
    Ok(SuccessResponse::ok(outcome.message(pid)))
}

/// `POST /api/kill`: any process by pid.
pub async fn kill(
    State(s): State<Arc<AppState>>,
    Json(req): Json<PidRequest>,
) -> ApiResult<SuccessResponse> {
    let pid = req.pid()?;
    let outcome = s.processes.kill(pid).await?;
    Ok(SuccessResponse::ok(outcome.message(pid)))
}

/// `GET /api/processes`
///
/// Interpreter processes on the host, each flagged when this server
/// launched it. Managed entries no longer on the host (exited, awaiting
/// reaping) are appended so their status stays visible.
pub async fn processes(State(s): State<Arc<AppState>>) -> ApiResult<Vec<ProcessEntry>> {
    let pattern = s.config.process_match.clone();
    let host = tokio::task::spawn_blocking(move || system::interpreter_processes(&pattern)).await?;
    Ok(Json(merge_processes(host, s.processes.summaries(), &s.config.interpreter)))
}

pub(crate) fn merge_processes(
    host: Vec<InterpreterProcess>,
    managed: Vec<ProcessSummary>,
    interpreter: &str,
) -> Vec<ProcessEntry> {
    let seen: HashSet<u32> = host.iter().map(|p| p.pid).collect();
    let status_of = |pid: u32| managed.iter().find(|m| m.pid == pid).map(|m| m.status);

    let mut entries: Vec<ProcessEntry> = host
        .into_iter()
        .map(|process| {
            let status = status_of(process.pid);
            ProcessEntry { managed: status.is_some(), status, process }
        })
        .collect();

    for summary in managed.iter().filter(|m| !seen.contains(&m.pid)) {
        let script_path = summary.script_path.to_string_lossy().into_owned();
        let script_name = summary
            .script_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script_path.clone());
        entries.push(ProcessEntry {
            process: InterpreterProcess {
                pid: summary.pid,
                script_name,
                cmdline: format!("{interpreter} {script_path}"),
                script_path,
                start_time: summary.started_at.format(TIMESTAMP_FORMAT).to_string(),
            },
            managed: true,
            status: Some(summary.status),
        });
    }
    entries.sort_by_key(|e| e.process.pid);
    entries
}
