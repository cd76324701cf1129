// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful-then-forced termination: SIGTERM, bounded wait, SIGKILL.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{ExitInfo, ProcessError};

/// Interval between liveness checks for processes we cannot wait on.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Still alive after the grace period; SIGKILL sent.
    Killed,
    /// Had already exited.
    AlreadyExited,
}

impl StopOutcome {
    pub fn message(&self, pid: u32) -> String {
        match self {
            Self::Terminated => format!("Process {pid} terminated successfully"),
            Self::Killed => format!("Process {pid} killed forcefully"),
            Self::AlreadyExited => format!("Process {pid} had already exited"),
        }
    }
}

pub fn to_pid(pid: u32) -> Result<Pid, ProcessError> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 && pid != std::process::id() => Ok(Pid::from_raw(raw)),
        _ => Err(ProcessError::InvalidPid(pid)),
    }
}

/// Terminate a child we spawned in its own process group, using the exit
/// watch fed by its waiter task to observe the exit.
pub async fn stop_group(
    pid: u32,
    mut exit: watch::Receiver<Option<ExitInfo>>,
    timeout: Duration,
) -> Result<StopOutcome, ProcessError> {
    if exit.borrow().is_some() {
        return Ok(StopOutcome::AlreadyExited);
    }
    let group = Pid::from_raw(-to_pid(pid)?.as_raw());

    match kill(group, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(StopOutcome::AlreadyExited),
        Err(e) => return Err(ProcessError::Terminate(format!("SIGTERM {pid}: {e}"))),
    }
    if tokio::time::timeout(timeout, exit.wait_for(|e| e.is_some())).await.is_ok() {
        return Ok(StopOutcome::Terminated);
    }

    match kill(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(ProcessError::Terminate(format!("SIGKILL {pid}: {e}"))),
    }
    let _ = tokio::time::timeout(timeout, exit.wait_for(|e| e.is_some())).await;
    Ok(StopOutcome::Killed)
}

/// Terminate an arbitrary process by pid, probing for its disappearance.
pub async fn stop_pid(pid: u32, timeout: Duration) -> Result<StopOutcome, ProcessError> {
    let target = to_pid(pid)?;
    match kill(target, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Err(ProcessError::NotFound(pid)),
        Err(e) => return Err(ProcessError::Terminate(format!("SIGTERM {pid}: {e}"))),
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        tokio::time::sleep(LIVENESS_INTERVAL).await;
        if !alive(target) {
            return Ok(StopOutcome::Terminated);
        }
    }

    match kill(target, Signal::SIGKILL) {
        Ok(()) => Ok(StopOutcome::Killed),
        Err(Errno::ESRCH) => Ok(StopOutcome::Terminated),
        Err(e) => Err(ProcessError::Terminate(format!("SIGKILL {pid}: {e}"))),
    }
}

/// Whether a signal could be delivered to `pid`.
pub fn alive(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(Errno::ESRCH))
}

#[cfg(test)]
#[path = "terminate_tests.rs"]
mod tests;
