// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Captured output of launched processes: snapshot and live SSE tail.
//!
//! A live interpreter the server did not launch has no captured output;
//! both endpoints describe the process instead.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::Json;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::error::ErrorCode;
use crate::process::{find_log_file, tail_log_file, TailEvent};
use crate::system::{process_details, ProcessDetails};
use crate::transport::state::AppState;

/// Lines returned from a log file when the process is no longer tracked.
const FILE_TAIL_LINES: usize = 100;

const UNMANAGED_NOTE: &str =
    "note: this process was not started by this server; live output is unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Active,
    File,
    ProcessInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub pid: u32,
    pub logs: Vec<String>,
    pub source: LogSource,
    /// Set only for `process_info`.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub cursor: u64,
}

/// Details of `pid` when it is a live host interpreter; 400 when it is
/// live but something else.
async fn unmanaged(s: &AppState, pid: u32) -> Result<Option<ProcessDetails>, ApiError> {
    let Some(details) = tokio::task::spawn_blocking(move || process_details(pid)).await? else {
        return Ok(None);
    };
    let pattern = &s.config.process_match;
    if !details.name_matches(pattern) {
        return Err(ApiError::bad_request(format!("process {pid} is not a {pattern} process")));
    }
    Ok(Some(details))
}

/// `GET /api/logs/{pid}`
///
/// Captured records of a managed process, else a description of a live
/// unmanaged interpreter, else the tail of its log file.
pub async fn logs(State(s): State<Arc<AppState>>, Path(pid): Path<u32>) -> ApiResult<LogsResponse> {
    if let Ok(records) = s.processes.list_records(pid) {
        let logs = records.iter().map(|r| r.line()).collect();
        return Ok(Json(LogsResponse { pid, logs, source: LogSource::Active, process: None }));
    }

    if let Some(details) = unmanaged(&s, pid).await? {
        return Ok(Json(LogsResponse {
            pid,
            logs: vec![UNMANAGED_NOTE.to_owned()],
            source: LogSource::ProcessInfo,
            process: Some(details),
        }));
    }

    let dir = s.processes.logs_dir().to_path_buf();
    let tail = tokio::task::spawn_blocking(move || {
        find_log_file(&dir, pid).map(|path| tail_log_file(&path, FILE_TAIL_LINES))
    })
    .await?;
    match tail {
        Some(Ok(logs)) => Ok(Json(LogsResponse { pid, logs, source: LogSource::File, process: None })),
        Some(Err(e)) => Err(ApiError::internal(format!("Error reading log file: {e}"))),
        None => Err(ApiError::new(
            ErrorCode::NotFound,
            format!("process {pid} not found and no log file available"),
        )),
    }
}

/// Fixed description lines streamed for an unmanaged process.
fn info_lines(pid: u32, details: &ProcessDetails) -> Vec<String> {
    vec![
        UNMANAGED_NOTE.to_owned(),
        format!("PID: {pid}"),
        format!("Name: {}", details.name),
        format!("Command line: {}", details.cmdline),
        format!("Status: {}", details.status),
        format!("Started: {}", details.create_time),
    ]
}

/// `GET /api/logs/stream/{pid}`
///
/// One `{"line", "seq"}` event per record (event id = seq), then
/// `{"end": true}` once the process is gone. An unmanaged interpreter gets
/// its description lines and `end` straight away. Ends early on server
/// shutdown.
pub async fn stream(
    State(s): State<Arc<AppState>>,
    Path(pid): Path<u32>,
    Query(q): Query<StreamQuery>,
) -> Result<Sse<KeepAliveStream<BoxStream<'static, Result<Event, axum::Error>>>>, ApiError> {
    let events = match s.processes.stream_records(pid, q.cursor, s.config.stream_poll()) {
        Ok(tail) => tail
            .map(|event| match event {
                TailEvent::Record(record) => Event::default()
                    .id(record.seq.to_string())
                    .json_data(serde_json::json!({ "line": record.line(), "seq": record.seq })),
                TailEvent::End => end_event(),
            })
            .boxed(),
        Err(e) => {
            let Some(details) = unmanaged(&s, pid).await? else {
                return Err(e.into());
            };
            let lines = info_lines(pid, &details)
                .into_iter()
                .map(|line| Event::default().json_data(serde_json::json!({ "line": line })));
            stream::iter(lines).chain(stream::once(async { end_event() })).boxed()
        }
    };
    // Open streams must not hold up graceful shutdown.
    let events = events.take_until(s.shutdown.clone().cancelled_owned()).boxed();
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn end_event() -> Result<Event, axum::Error> {
    Event::default().json_data(serde_json::json!({ "end": true }))
}
