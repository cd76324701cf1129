// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launched scripts: output capture, per-process logs, termination, and the
//! table of processes this server started.

pub mod capture;
pub mod logger;
pub mod table;
pub mod terminate;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::ErrorCode;
use crate::log_buffer::LogRecord;

pub use capture::{CaptureHandle, OutputCapture};
pub use logger::ProcessLogger;
pub use table::{ManagedProcess, ProcessTable, TableSettings};
pub use terminate::StopOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    InvalidPid(u32),
    InvalidPath(String),
    ScriptNotFound(String),
    NotFound(u32),
    Spawn(String),
    Terminate(String),
}

impl ProcessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidPid(_) | Self::InvalidPath(_) => ErrorCode::BadRequest,
            Self::ScriptNotFound(_) | Self::NotFound(_) => ErrorCode::NotFound,
            Self::Spawn(_) | Self::Terminate(_) => ErrorCode::ProcessFailed,
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPid(pid) => write!(f, "invalid pid: {pid}"),
            Self::InvalidPath(path) => write!(f, "script path is not in monitored paths: {path}"),
            Self::ScriptNotFound(path) => write!(f, "script {path} not found"),
            Self::NotFound(pid) => write!(f, "process {pid} not found"),
            Self::Spawn(msg) => write!(f, "spawn failed: {msg}"),
            Self::Terminate(msg) => write!(f, "terminate failed: {msg}"),
        }
    }
}

impl std::error::Error for ProcessError {}

/// What to launch.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Prefix of the log file name.
    pub label: String,
    pub script_path: PathBuf,
}

impl ProcessSpec {
    /// Run `script` with `interpreter` from the script's own directory.
    pub fn script(interpreter: &str, script: &Path) -> Self {
        let label = script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_owned());
        Self {
            program: interpreter.to_owned(),
            args: vec![script.to_string_lossy().into_owned()],
            cwd: script.parent().filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf),
            label,
            script_path: script.to_path_buf(),
        }
    }
}

/// How a launched process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    pub exited_at: DateTime<Local>,
}

impl ExitInfo {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self { code: status.code(), signal: status.signal(), exited_at: Local::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Exited,
}

/// Serializable view of one managed process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub pid: u32,
    pub script_path: PathBuf,
    pub started_at: DateTime<Local>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitInfo>,
    pub log_path: PathBuf,
    pub records: usize,
}

/// Item yielded by [`ProcessTable::stream_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    Record(LogRecord),
    /// The process no longer exists; nothing further will be yielded.
    End,
}

/// `<label>_<pid>_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_name(label: &str, pid: u32, at: DateTime<Local>) -> String {
    format!("{label}_{pid}_{}.log", at.format("%Y%m%d_%H%M%S"))
}

/// Split a name produced by [`log_file_name`] into `(pid, "YYYYmmdd_HHMMSS")`.
///
/// Parsed from the right, so a label that itself contains `_<digits>_`
/// never shadows the pid field.
fn parse_log_file_name(name: &str) -> Option<(u32, String)> {
    let stem = name.strip_suffix(".log")?;
    let mut fields = stem.rsplitn(4, '_');
    let (time, date, pid, label) = (fields.next()?, fields.next()?, fields.next()?, fields.next()?);
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if label.is_empty() || !digits(date, 8) || !digits(time, 6) {
        return None;
    }
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((pid.parse().ok()?, format!("{date}_{time}")))
}

/// Newest log file in `dir` written for `pid`, by the timestamp in its name.
pub fn find_log_file(dir: &Path, pid: u32) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let (owner, stamp) = parse_log_file_name(&name)?;
            (owner == pid).then(|| (stamp, entry.path()))
        })
        .collect();
    matches.sort();
    matches.pop().map(|(_, path)| path)
}

/// Last `limit` lines of a log file.
pub fn tail_log_file(path: &Path, limit: usize) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&contents);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..].iter().map(|l| l.trim_end().to_owned()).collect())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
